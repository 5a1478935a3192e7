use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use sim_api::http::HttpServerConfig;
use sim_core::analysis::{
    AnalysisParams, AnalysisType, ParamValue, RequestedResult, SimulationRequest,
    SimulationResults, Waveform,
};
use sim_core::config::SimulatorConfig;
use sim_core::engine::Engine;
use sim_core::netlist::probe_netlist;

#[derive(Parser)]
#[command(name = "sim-cli")]
#[command(about = "Run SPICE netlists through ngspice in batch mode", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a netlist file and print the requested results
    Run(RunArgs),
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Args)]
struct SimulatorArgs {
    /// Simulator executable (overrides NGSPICE_PATH and the default search)
    #[arg(long, value_name = "PATH")]
    ngspice: Option<PathBuf>,

    /// Seconds before the simulator is killed
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl SimulatorArgs {
    fn config(&self) -> SimulatorConfig {
        let mut config = SimulatorConfig::from_env();
        if let Some(path) = &self.ngspice {
            config = config.with_executable(path);
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        config
    }
}

#[derive(Args)]
struct RunArgs {
    /// Netlist body: component and source lines, directives optional
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// op, transient (tran), ac or dc
    #[arg(short, long, default_value = "op", value_parser = parse_analysis)]
    analysis: AnalysisType,

    /// Circuit title (defaults to the file stem)
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    step_time: Option<String>,
    #[arg(long)]
    end_time: Option<String>,

    #[arg(long)]
    start_frequency: Option<String>,
    #[arg(long)]
    stop_frequency: Option<String>,
    #[arg(long)]
    points: Option<String>,
    /// dec, oct or lin
    #[arg(long)]
    sweep_type: Option<String>,

    /// DC sweep source
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    stop: Option<String>,
    #[arg(long)]
    step: Option<String>,

    /// Node voltage to report (repeatable)
    #[arg(long = "node", value_name = "NODE")]
    nodes: Vec<String>,

    /// Source branch current to report (repeatable)
    #[arg(long = "branch", value_name = "SOURCE")]
    branches: Vec<String>,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,

    /// Digits after the decimal point in text output
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(1..=15))]
    precision: u8,

    #[command(flatten)]
    simulator: SimulatorArgs,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,

    #[command(flatten)]
    simulator: SimulatorArgs,
}

fn parse_analysis(value: &str) -> Result<AnalysisType, String> {
    AnalysisType::from_name(value).ok_or_else(|| format!("unknown analysis type: {}", value))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let results = run(&args)?;
            if !results.success {
                process::exit(1);
            }
            Ok(())
        }
        Command::Serve(args) => serve(&args),
    }
}

fn run(args: &RunArgs) -> Result<SimulationResults> {
    let netlist = fs::read_to_string(&args.netlist)
        .with_context(|| format!("failed to read {}", args.netlist.display()))?;

    let request = SimulationRequest {
        circuit_name: args.name.clone().unwrap_or_else(|| {
            args.netlist
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Simulated Circuit".to_string())
        }),
        requested_results: requested_results(args, &netlist),
        netlist_string: netlist,
        analysis_type: args.analysis,
        analysis_parameters: analysis_parameters(args),
    };

    let engine = Engine::new(&args.simulator.config())?;
    let results = engine.simulate(&request);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results, usize::from(args.precision));
    }
    if !results.success {
        eprintln!("simulation failed: {}", results.message.trim_end());
    }
    Ok(results)
}

fn serve(args: &ServeArgs) -> Result<()> {
    let config = HttpServerConfig {
        bind_addr: args.bind.clone(),
        simulator: args.simulator.config(),
    };
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime
        .block_on(sim_api::http::run(config))
        .map_err(anyhow::Error::msg)
}

fn analysis_parameters(args: &RunArgs) -> AnalysisParams {
    let mut params = AnalysisParams::new();
    let pairs = [
        ("step_time", &args.step_time),
        ("end_time", &args.end_time),
        ("start_frequency", &args.start_frequency),
        ("stop_frequency", &args.stop_frequency),
        ("number_of_points", &args.points),
        ("sweep_type", &args.sweep_type),
        ("source_name", &args.source),
        ("start_value", &args.start),
        ("end_value", &args.stop),
        ("step_value", &args.step),
    ];
    for (name, value) in pairs {
        if let Some(value) = value {
            params.insert(name.to_string(), ParamValue::from(value.as_str()));
        }
    }
    params
}

/// Explicit `--node`/`--branch` selections, or everything the netlist
/// mentions when there are none.
fn requested_results(args: &RunArgs, netlist: &str) -> Vec<RequestedResult> {
    if !args.nodes.is_empty() || !args.branches.is_empty() {
        return args
            .nodes
            .iter()
            .map(|node| RequestedResult::node(node))
            .chain(args.branches.iter().map(|branch| RequestedResult::branch(branch)))
            .collect();
    }

    let probe = probe_netlist(netlist);
    let mut requested: Vec<RequestedResult> =
        probe.nodes.iter().map(|node| RequestedResult::node(node)).collect();
    // AC tables carry node voltages only.
    if args.analysis != AnalysisType::Ac {
        requested.extend(probe.sources.iter().map(|source| RequestedResult::branch(source)));
    }
    requested
}

fn print_results(results: &SimulationResults, precision: usize) {
    println!(
        "{} analysis: {}",
        results.simulation_type,
        if results.success { "ok" } else { "failed" }
    );
    if !results.success {
        return;
    }

    let mut columns: Vec<(String, &Waveform)> = Vec::new();
    for result in &results.node_voltages {
        columns.push((format!("V({})", result.node), &result.voltage));
    }
    for result in &results.branch_currents {
        columns.push((format!("I({})", result.branch), &result.current));
    }

    let axis = match (&results.time_axis, &results.frequency_axis, &results.sweep_axis) {
        (Some(axis), _, _) => Some(("time", axis)),
        (_, Some(axis), _) => Some(("frequency", axis)),
        (_, _, Some(axis)) => Some(("sweep", axis)),
        _ => None,
    };

    let Some((axis_name, axis)) = axis else {
        for (name, waveform) in &columns {
            match waveform {
                Waveform::Scalar(value) => println!("{} = {:.*e}", name, precision, value),
                Waveform::Series(values) => {
                    let last = values.last().copied().unwrap_or(0.0);
                    println!("{} = {:.*e}", name, precision, last)
                }
            }
        }
        return;
    };

    let width = precision + 8;
    let mut header = format!("{:>width$}", axis_name, width = width);
    for (name, _) in &columns {
        header.push_str(&format!(" {:>width$}", name, width = width));
    }
    println!("{}", header);

    for (row, axis_value) in axis.iter().enumerate() {
        let mut line = format_cell(*axis_value, width, precision);
        for (_, waveform) in &columns {
            let value = match waveform {
                Waveform::Series(values) => values.get(row).copied(),
                Waveform::Scalar(value) => Some(*value),
            };
            match value {
                Some(value) => {
                    line.push(' ');
                    line.push_str(&format_cell(value, width, precision));
                }
                None => line.push_str(&format!(" {:>width$}", "-", width = width)),
            }
        }
        println!("{}", line);
    }
}

/// Right-aligned scientific notation with `precision` digits after the point.
fn format_cell(value: f64, width: usize, precision: usize) -> String {
    format!("{:>width$.prec$e}", value, width = width, prec = precision)
}
