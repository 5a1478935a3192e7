use std::time::Duration;

use sim_core::analysis::{
    AnalysisParams, AnalysisType, ParamValue, RequestedResult, SimulationRequest, Waveform,
};
use sim_core::engine::{project_results, select_strategy, SUCCESS_MESSAGE};
use sim_core::netlist::prepare_netlist;
use sim_core::output::{parse_output, ParseStrategy};

const OP_DIVIDER: &str = include_str!("fixtures/op_divider.txt");
const TRAN_PRINT: &str = include_str!("fixtures/tran_print.txt");

const DIVIDER: &str = "V1 in 0 DC 5\nR1 in out 1k\nR2 out 0 2k\n";
const RC: &str = "V1 in 0 DC 5\nR1 in out 1k\nC1 out 0 1u\n";

fn request(
    netlist: &str,
    analysis: AnalysisType,
    params: &[(&str, &str)],
    results: Vec<RequestedResult>,
) -> SimulationRequest {
    let analysis_parameters: AnalysisParams = params
        .iter()
        .map(|(name, value)| (name.to_string(), ParamValue::from(*value)))
        .collect();
    SimulationRequest {
        circuit_name: "test circuit".to_string(),
        netlist_string: netlist.to_string(),
        analysis_type: analysis,
        analysis_parameters,
        requested_results: results,
    }
}

#[test]
fn project_keeps_requested_and_skips_missing() {
    let parsed = parse_output(OP_DIVIDER, AnalysisType::OperatingPoint, &ParseStrategy::Heuristic);
    let req = request(
        DIVIDER,
        AnalysisType::OperatingPoint,
        &[],
        vec![
            RequestedResult::node("out"),
            RequestedResult::node("nope"),
            RequestedResult::branch("V1"),
            RequestedResult::branch("V9"),
        ],
    );
    let results = project_results(&req, &parsed);
    assert!(results.success);
    assert_eq!(results.message, SUCCESS_MESSAGE);
    assert_eq!(results.node_voltages.len(), 1);
    assert_eq!(results.node_voltages[0].node, "out");
    assert_eq!(results.node_voltages[0].voltage, Waveform::Scalar(3.333333));
    assert_eq!(results.node_voltages[0].unit, "V");
    assert_eq!(results.branch_currents.len(), 1);
    assert_eq!(results.branch_currents[0].branch, "V1");
    assert_eq!(results.branch_currents[0].current, Waveform::Scalar(-1.666667e-03));
    assert_eq!(results.branch_currents[0].unit, "A");
    assert_eq!(results.time_axis, None);
}

#[test]
fn project_matches_names_case_insensitively() {
    let parsed = parse_output(OP_DIVIDER, AnalysisType::OperatingPoint, &ParseStrategy::Heuristic);
    let req = request(
        DIVIDER,
        AnalysisType::OperatingPoint,
        &[],
        vec![RequestedResult::node("OUT"), RequestedResult::branch("v1#branch")],
    );
    let results = project_results(&req, &parsed);
    assert_eq!(results.node_voltages[0].node, "OUT");
    assert_eq!(results.branch_currents[0].branch, "v1#branch");
}

#[test]
fn project_transient_uses_generated_columns() {
    let req = request(
        RC,
        AnalysisType::Transient,
        &[("step_time", "100us"), ("end_time", "300us")],
        vec![RequestedResult::node("out"), RequestedResult::branch("V1")],
    );
    let cmd = sim_core::analysis::AnalysisCmd::from_request(
        req.analysis_type,
        &req.analysis_parameters,
    )
    .unwrap();
    let prepared = prepare_netlist(&req.netlist_string, &cmd, &req.circuit_name);
    let strategy = select_strategy(&cmd, &prepared);
    assert!(matches!(strategy, ParseStrategy::Columnar { .. }));

    let parsed = parse_output(TRAN_PRINT, req.analysis_type, &strategy);
    let results = project_results(&req, &parsed);
    assert!(results.success);
    assert_eq!(results.time_axis, Some(vec![0.0, 1e-4, 2e-4, 3e-4]));
    assert_eq!(results.frequency_axis, None);
    assert_eq!(results.node_voltages[0].voltage.len(), 4);
    assert_eq!(results.branch_currents[0].current.first(), Some(-5.0e-03));
}

#[test]
fn select_strategy_falls_back_for_user_print() {
    let netlist = format!("{}.print tran v(out)\n", RC);
    let req = request(
        &netlist,
        AnalysisType::Transient,
        &[("step_time", "1us"), ("end_time", "1ms")],
        Vec::new(),
    );
    let cmd = sim_core::analysis::AnalysisCmd::from_request(
        req.analysis_type,
        &req.analysis_parameters,
    )
    .unwrap();
    let prepared = prepare_netlist(&req.netlist_string, &cmd, &req.circuit_name);
    assert_eq!(select_strategy(&cmd, &prepared), ParseStrategy::Heuristic);
}

#[test]
fn parser_error_turns_into_failure_with_partial_data() {
    let raw = format!("{}\nError: no such vector\n", OP_DIVIDER);
    let parsed = parse_output(&raw, AnalysisType::OperatingPoint, &ParseStrategy::Heuristic);
    let req = request(
        DIVIDER,
        AnalysisType::OperatingPoint,
        &[],
        vec![RequestedResult::node("out")],
    );
    let results = project_results(&req, &parsed);
    assert!(!results.success);
    assert_eq!(results.message, "Error: no such vector");
    assert_eq!(results.node_voltages.len(), 1);
}

#[cfg(unix)]
mod with_fake_simulator {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use sim_core::engine::Engine;
    use sim_core::runner::SimulatorRunner;
    use tempfile::TempDir;

    use super::*;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-ngspice");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Script that saves the netlist it was given and prints `output`.
    fn echo_engine(dir: &Path, output: &str, timeout: Duration) -> Engine {
        let captured = dir.join("captured.cir");
        let body = format!(
            "cp \"$2\" '{}'\ncat <<'SIMOUT'\n{}\nSIMOUT",
            captured.display(),
            output
        );
        let script = write_script(dir, &body);
        let runner = SimulatorRunner::with_executable(script)
            .unwrap()
            .in_work_dir(dir);
        Engine::with_runner(runner, timeout)
    }

    #[test]
    fn operating_point_end_to_end() {
        let dir = TempDir::new().unwrap();
        let engine = echo_engine(dir.path(), OP_DIVIDER, Duration::from_secs(10));
        let req = request(
            DIVIDER,
            AnalysisType::OperatingPoint,
            &[],
            vec![RequestedResult::node("out"), RequestedResult::branch("V1")],
        );

        let results = engine.simulate(&req);
        assert!(results.success, "{}", results.message);
        assert_eq!(results.simulation_type, AnalysisType::OperatingPoint);
        assert_eq!(results.node_voltages[0].voltage, Waveform::Scalar(3.333333));
        assert_eq!(
            results.branch_currents[0].current,
            Waveform::Scalar(-1.666667e-03)
        );

        let sent = fs::read_to_string(dir.path().join("captured.cir")).unwrap();
        assert!(sent.starts_with(".title test circuit\n"));
        assert!(sent.contains("\n.op\n"));
        assert!(sent.ends_with(".end\n"));
    }

    #[test]
    fn transient_end_to_end() {
        let dir = TempDir::new().unwrap();
        let engine = echo_engine(dir.path(), TRAN_PRINT, Duration::from_secs(10));
        let req = request(
            RC,
            AnalysisType::Transient,
            &[("step_time", "100us"), ("end_time", "300us")],
            vec![RequestedResult::node("out")],
        );

        let results = engine.simulate(&req);
        assert!(results.success, "{}", results.message);
        assert_eq!(results.time_axis.as_ref().map(Vec::len), Some(4));
        assert_eq!(
            results.node_voltages[0].voltage,
            Waveform::Series(vec![0.0, 4.758129e-01, 9.063462e-01, 1.295909e+00])
        );

        let sent = fs::read_to_string(dir.path().join("captured.cir")).unwrap();
        assert!(sent.contains(".tran 100us 300us\n"));
        assert!(sent.contains(".print tran v(in) v(out) i(V1)\n"));
    }

    #[test]
    fn nonzero_exit_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "echo 'netlist parse failed' >&2\nexit 1");
        let engine = Engine::with_runner(
            SimulatorRunner::with_executable(script).unwrap(),
            Duration::from_secs(10),
        );
        let req = request(DIVIDER, AnalysisType::OperatingPoint, &[], Vec::new());

        let results = engine.simulate(&req);
        assert!(!results.success);
        assert_eq!(results.message, "netlist parse failed\n");
        assert!(results.node_voltages.is_empty());
    }

    #[test]
    fn nonzero_exit_without_stderr_names_status() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "exit 2");
        let engine = Engine::with_runner(
            SimulatorRunner::with_executable(script).unwrap(),
            Duration::from_secs(10),
        );
        let req = request(DIVIDER, AnalysisType::OperatingPoint, &[], Vec::new());

        let results = engine.simulate(&req);
        assert!(!results.success);
        assert_eq!(results.message, "simulator exited with status Some(2)");
    }

    #[test]
    fn timeout_becomes_failure_result() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "exec sleep 10");
        let engine = Engine::with_runner(
            SimulatorRunner::with_executable(script).unwrap(),
            Duration::from_secs(1),
        );
        let req = request(DIVIDER, AnalysisType::OperatingPoint, &[], Vec::new());

        let results = engine.simulate(&req);
        assert!(!results.success);
        assert_eq!(results.message, "simulation timed out after 1 seconds");
    }

    #[test]
    fn invalid_parameters_fail_before_running() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let script = write_script(dir.path(), &format!("touch '{}'", marker.display()));
        let engine = Engine::with_runner(
            SimulatorRunner::with_executable(script).unwrap(),
            Duration::from_secs(10),
        );
        let req = request(DIVIDER, AnalysisType::Transient, &[("step_time", "1us")], Vec::new());

        let results = engine.simulate(&req);
        assert!(!results.success);
        assert!(results.message.contains("end_time"), "{}", results.message);
        assert!(!marker.exists());
    }

    #[test]
    fn error_in_output_with_clean_exit_fails() {
        let dir = TempDir::new().unwrap();
        let engine = echo_engine(
            dir.path(),
            "Circuit: test circuit\nError: unknown subckt: x1 a b foo",
            Duration::from_secs(10),
        );
        let req = request(DIVIDER, AnalysisType::OperatingPoint, &[], Vec::new());

        let results = engine.simulate(&req);
        assert!(!results.success);
        assert_eq!(results.message, "Error: unknown subckt: x1 a b foo");
    }
}

#[test]
#[ignore = "requires ngspice"]
fn real_ngspice_divider() {
    let engine = sim_core::engine::Engine::new(&sim_core::config::SimulatorConfig::from_env())
        .expect("ngspice not installed");
    let req = request(
        DIVIDER,
        AnalysisType::OperatingPoint,
        &[],
        vec![RequestedResult::node("out")],
    );
    let results = engine.simulate(&req);
    assert!(results.success, "{}", results.message);
    match results.node_voltages[0].voltage {
        Waveform::Scalar(value) => assert!((value - 10.0 / 3.0).abs() < 1e-4),
        ref other => panic!("expected scalar, got {:?}", other),
    }
}
