use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::analysis::{
    AnalysisCmd, AnalysisType, BranchCurrentResult, NodeVoltageResult, RequestedResult,
    ResultKind, SimulationRequest, SimulationResults, Waveform,
};
use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::netlist::{prepare_netlist, PreparedNetlist};
use crate::output::{parse_output, ParseStrategy, ParsedSimulationOutput};
use crate::runner::SimulatorRunner;

pub const SUCCESS_MESSAGE: &str = "Simulation completed successfully.";

/// Preprocess, run, parse, project. Holds nothing mutable, so one engine
/// can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Engine {
    runner: SimulatorRunner,
    timeout: Duration,
}

impl Engine {
    /// Fails with `SimulatorNotFound` when no candidate resolves.
    pub fn new(config: &SimulatorConfig) -> Result<Self> {
        let runner = SimulatorRunner::locate(config)?;
        Ok(Self::with_runner(runner, config.timeout()))
    }

    pub fn with_runner(runner: SimulatorRunner, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub fn runner(&self) -> &SimulatorRunner {
        &self.runner
    }

    /// Never fails: errors and panics become `success == false` results.
    pub fn simulate(&self, request: &SimulationRequest) -> SimulationResults {
        log::info!(
            "simulating '{}' ({})",
            request.circuit_name,
            request.analysis_type
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_simulate(request)));
        match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                log::error!("simulation of '{}' failed: {}", request.circuit_name, err);
                SimulationResults::failure(request.analysis_type, err.to_string())
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|msg| msg.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "simulation panicked".to_string());
                log::error!("simulation of '{}' panicked: {}", request.circuit_name, message);
                SimulationResults::failure(request.analysis_type, message)
            }
        }
    }

    fn try_simulate(&self, request: &SimulationRequest) -> Result<SimulationResults> {
        let cmd = AnalysisCmd::from_request(request.analysis_type, &request.analysis_parameters)?;
        let prepared = prepare_netlist(&request.netlist_string, &cmd, &request.circuit_name);
        log::debug!("prepared netlist:\n{}", prepared.text);

        let output = self.runner.run(&prepared.text, self.timeout)?;
        if !output.success() {
            log::warn!(
                "simulator exited with {:?} for '{}'",
                output.exit_code,
                request.circuit_name
            );
            let message = if output.stderr.trim().is_empty() {
                format!("simulator exited with status {:?}", output.exit_code)
            } else {
                output.stderr
            };
            return Ok(SimulationResults::failure(request.analysis_type, message));
        }

        let strategy = select_strategy(&cmd, &prepared);
        let parsed = parse_output(&output.stdout, request.analysis_type, &strategy);
        Ok(project_results(request, &parsed))
    }
}

/// Columnar parsing whenever the print directive is ours, header sniffing
/// for netlists that brought their own.
pub fn select_strategy(cmd: &AnalysisCmd, prepared: &PreparedNetlist) -> ParseStrategy {
    if !prepared.print_synthesized {
        return ParseStrategy::Heuristic;
    }
    let sources = match cmd {
        AnalysisCmd::Ac { .. } => Vec::new(),
        _ => prepared.sources.clone(),
    };
    ParseStrategy::Columnar {
        nodes: prepared.nodes.clone(),
        sources,
    }
}

/// Keeps only what the caller asked for; missing names are logged and
/// left out.
pub fn project_results(
    request: &SimulationRequest,
    parsed: &ParsedSimulationOutput,
) -> SimulationResults {
    let analysis = request.analysis_type;
    let mut node_voltages = Vec::new();
    let mut branch_currents = Vec::new();

    for requested in &request.requested_results {
        let RequestedResult { kind, name } = requested;
        let found = match kind {
            ResultKind::NodeVoltage => lookup_node(parsed, name),
            ResultKind::BranchCurrent => lookup_branch(parsed, name),
        };
        let Some(waveform) = found.and_then(|waveform| shape_for(analysis, waveform)) else {
            log::warn!("requested {:?} '{}' not found in simulator output", kind, name);
            continue;
        };
        match kind {
            ResultKind::NodeVoltage => node_voltages.push(NodeVoltageResult {
                node: name.clone(),
                voltage: waveform,
                unit: "V".to_string(),
            }),
            ResultKind::BranchCurrent => branch_currents.push(BranchCurrentResult {
                branch: name.clone(),
                current: waveform,
                unit: "A".to_string(),
            }),
        }
    }

    let non_empty = |axis: &Option<Vec<f64>>| axis.clone().filter(|values| !values.is_empty());
    let (time_axis, frequency_axis, sweep_axis) = match analysis {
        AnalysisType::Transient => (non_empty(&parsed.time_axis), None, None),
        AnalysisType::Ac => (None, non_empty(&parsed.frequency_axis), None),
        AnalysisType::Dc => (None, None, non_empty(&parsed.sweep_axis)),
        _ => (None, None, None),
    };

    let (success, message) = match (parsed.success, &parsed.error) {
        (false, Some(error)) => (false, error.clone()),
        (false, None) => (false, "simulator reported an error".to_string()),
        (true, _) => (true, SUCCESS_MESSAGE.to_string()),
    };

    SimulationResults {
        success,
        message,
        simulation_type: analysis,
        node_voltages,
        branch_currents,
        time_axis,
        frequency_axis,
        sweep_axis,
    }
}

fn lookup_node<'a>(parsed: &'a ParsedSimulationOutput, name: &str) -> Option<&'a Waveform> {
    parsed
        .node_voltages
        .get(name)
        .or_else(|| parsed.node_voltages.get(&name.to_lowercase()))
}

fn lookup_branch<'a>(parsed: &'a ParsedSimulationOutput, name: &str) -> Option<&'a Waveform> {
    let lower = name.to_lowercase();
    parsed
        .branch_currents
        .get(name)
        .or_else(|| parsed.branch_currents.get(&format!("{}#branch", lower)))
        .or_else(|| parsed.branch_currents.get(&lower))
}

/// Scalars for operating point (first sample of a series), the full
/// waveform otherwise.
fn shape_for(analysis: AnalysisType, waveform: &Waveform) -> Option<Waveform> {
    match analysis {
        AnalysisType::OperatingPoint => waveform.first().map(Waveform::Scalar),
        _ => Some(waveform.clone()),
    }
}
