//! Request/result data model and typed analysis commands.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::units::{parse_magnitude_lenient, parse_time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisType {
    #[serde(rename = "op")]
    OperatingPoint,
    #[serde(rename = "transient")]
    Transient,
    #[serde(rename = "ac")]
    Ac,
    #[serde(rename = "dc")]
    Dc,
    #[serde(rename = "noise")]
    Noise,
    #[serde(rename = "fourier")]
    Fourier,
}

impl AnalysisType {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisType::OperatingPoint => "op",
            AnalysisType::Transient => "transient",
            AnalysisType::Ac => "ac",
            AnalysisType::Dc => "dc",
            AnalysisType::Noise => "noise",
            AnalysisType::Fourier => "fourier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "op" => Some(AnalysisType::OperatingPoint),
            "transient" | "tran" => Some(AnalysisType::Transient),
            "ac" => Some(AnalysisType::Ac),
            "dc" => Some(AnalysisType::Dc),
            "noise" => Some(AnalysisType::Noise),
            "fourier" => Some(AnalysisType::Fourier),
            _ => None,
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An analysis parameter as it arrives in a request: a JSON number or a
/// SPICE token such as `"1us"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Token as it will appear in a directive.
    pub fn token(&self) -> String {
        match self {
            ParamValue::Number(value) => format!("{}", value),
            ParamValue::Text(text) => text.trim().to_string(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

pub type AnalysisParams = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    NodeVoltage,
    BranchCurrent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedResult {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub name: String,
}

impl RequestedResult {
    pub fn node(name: &str) -> Self {
        Self {
            kind: ResultKind::NodeVoltage,
            name: name.to_string(),
        }
    }

    pub fn branch(name: &str) -> Self {
        Self {
            kind: ResultKind::BranchCurrent,
            name: name.to_string(),
        }
    }
}

fn default_circuit_name() -> String {
    "Simulated Circuit".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    #[serde(default = "default_circuit_name")]
    pub circuit_name: String,
    pub netlist_string: String,
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub analysis_parameters: AnalysisParams,
    #[serde(default)]
    pub requested_results: Vec<RequestedResult>,
}

/// A scalar for operating-point runs, a series for swept runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Waveform {
    Scalar(f64),
    Series(Vec<f64>),
}

impl Waveform {
    pub fn push(&mut self, value: f64) {
        match self {
            Waveform::Series(values) => values.push(value),
            Waveform::Scalar(first) => *self = Waveform::Series(vec![*first, value]),
        }
    }

    /// First sample, if any.
    pub fn first(&self) -> Option<f64> {
        match self {
            Waveform::Scalar(value) => Some(*value),
            Waveform::Series(values) => values.first().copied(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Waveform::Scalar(_) => 1,
            Waveform::Series(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeVoltageResult {
    pub node: String,
    pub voltage: Waveform,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchCurrentResult {
    pub branch: String,
    pub current: Waveform,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub success: bool,
    pub message: String,
    pub simulation_type: AnalysisType,
    #[serde(default)]
    pub node_voltages: Vec<NodeVoltageResult>,
    #[serde(default)]
    pub branch_currents: Vec<BranchCurrentResult>,
    #[serde(default)]
    pub time_axis: Option<Vec<f64>>,
    #[serde(default)]
    pub frequency_axis: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_axis: Option<Vec<f64>>,
}

impl SimulationResults {
    pub fn failure(simulation_type: AnalysisType, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            simulation_type,
            node_voltages: Vec::new(),
            branch_currents: Vec::new(),
            time_axis: None,
            frequency_axis: None,
            sweep_axis: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcSweepType {
    Dec,
    Oct,
    Lin,
}

impl AcSweepType {
    pub fn keyword(&self) -> &'static str {
        match self {
            AcSweepType::Dec => "dec",
            AcSweepType::Oct => "oct",
            AcSweepType::Lin => "lin",
        }
    }
}

/// A validated analysis, ready to be rendered as a SPICE directive.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisCmd {
    Op,
    Tran {
        step: String,
        stop: String,
    },
    Ac {
        sweep: AcSweepType,
        points: u32,
        start: String,
        stop: String,
    },
    Dc {
        source: String,
        start: String,
        stop: String,
        step: String,
    },
}

impl AnalysisCmd {
    pub fn from_request(analysis: AnalysisType, params: &AnalysisParams) -> Result<Self> {
        match analysis {
            AnalysisType::OperatingPoint => Ok(AnalysisCmd::Op),
            AnalysisType::Transient => {
                let step = time_param(analysis, params, "step_time")?;
                let stop = time_param(analysis, params, "end_time")?;
                Ok(AnalysisCmd::Tran { step, stop })
            }
            AnalysisType::Ac => {
                let sweep = match params.get("sweep_type") {
                    None => AcSweepType::Dec,
                    Some(value) => match value.token().to_ascii_lowercase().as_str() {
                        "dec" => AcSweepType::Dec,
                        "oct" => AcSweepType::Oct,
                        "lin" => AcSweepType::Lin,
                        other => {
                            return Err(Error::InvalidParameter {
                                name: "sweep_type".to_string(),
                                value: other.to_string(),
                            })
                        }
                    },
                };
                let points = points_param(analysis, params, "number_of_points")?;
                let start = magnitude_param(analysis, params, "start_frequency")?;
                let stop = magnitude_param(analysis, params, "stop_frequency")?;
                Ok(AnalysisCmd::Ac {
                    sweep,
                    points,
                    start,
                    stop,
                })
            }
            AnalysisType::Dc => {
                let source = required(analysis, params, "source_name")?.token();
                if source.is_empty() || source.contains(char::is_whitespace) {
                    return Err(Error::InvalidParameter {
                        name: "source_name".to_string(),
                        value: source,
                    });
                }
                let start = magnitude_param(analysis, params, "start_value")?;
                let stop = magnitude_param(analysis, params, "end_value")?;
                let step = magnitude_param(analysis, params, "step_value")?;
                Ok(AnalysisCmd::Dc {
                    source,
                    start,
                    stop,
                    step,
                })
            }
            AnalysisType::Noise | AnalysisType::Fourier => {
                Err(Error::UnsupportedAnalysis(analysis.name().to_string()))
            }
        }
    }

    /// Directive keyword, lowercase with the leading dot.
    pub fn keyword(&self) -> &'static str {
        match self {
            AnalysisCmd::Op => ".op",
            AnalysisCmd::Tran { .. } => ".tran",
            AnalysisCmd::Ac { .. } => ".ac",
            AnalysisCmd::Dc { .. } => ".dc",
        }
    }

    /// Analysis name used after `.print`; `None` for `.op`.
    pub fn print_target(&self) -> Option<&'static str> {
        match self {
            AnalysisCmd::Op => None,
            AnalysisCmd::Tran { .. } => Some("tran"),
            AnalysisCmd::Ac { .. } => Some("ac"),
            AnalysisCmd::Dc { .. } => Some("dc"),
        }
    }

    pub fn directive(&self) -> String {
        match self {
            AnalysisCmd::Op => ".op".to_string(),
            AnalysisCmd::Tran { step, stop } => format!(".tran {} {}", step, stop),
            AnalysisCmd::Ac {
                sweep,
                points,
                start,
                stop,
            } => format!(".ac {} {} {} {}", sweep.keyword(), points, start, stop),
            AnalysisCmd::Dc {
                source,
                start,
                stop,
                step,
            } => format!(".dc {} {} {} {}", source, start, stop, step),
        }
    }
}

fn required<'a>(
    analysis: AnalysisType,
    params: &'a AnalysisParams,
    name: &str,
) -> Result<&'a ParamValue> {
    params.get(name).ok_or_else(|| Error::MissingParameter {
        analysis: analysis.name().to_string(),
        name: name.to_string(),
    })
}

fn time_param(analysis: AnalysisType, params: &AnalysisParams, name: &str) -> Result<String> {
    directive_token(required(analysis, params, name)?, name, parse_time)
}

fn magnitude_param(analysis: AnalysisType, params: &AnalysisParams, name: &str) -> Result<String> {
    directive_token(required(analysis, params, name)?, name, parse_magnitude_lenient)
}

/// The token must be one finite value with no inner whitespace, since it
/// is spliced into a space-separated directive.
fn directive_token(
    value: &ParamValue,
    name: &str,
    parse: fn(&str) -> Result<f64>,
) -> Result<String> {
    let token = value.token();
    let magnitude = match value {
        ParamValue::Number(number) => *number,
        ParamValue::Text(text) => parse(text)?,
    };
    if token.is_empty() || token.contains(char::is_whitespace) || !magnitude.is_finite() {
        return Err(Error::InvalidParameter {
            name: name.to_string(),
            value: token,
        });
    }
    Ok(token)
}

fn points_param(analysis: AnalysisType, params: &AnalysisParams, name: &str) -> Result<u32> {
    let value = required(analysis, params, name)?;
    let invalid = || Error::InvalidParameter {
        name: name.to_string(),
        value: value.token(),
    };
    let points = match value {
        ParamValue::Number(number) => {
            if number.fract() != 0.0 || *number < 1.0 || *number > u32::MAX as f64 {
                return Err(invalid());
            }
            *number as u32
        }
        ParamValue::Text(text) => text.trim().parse::<u32>().map_err(|_| invalid())?,
    };
    if points == 0 {
        return Err(invalid());
    }
    Ok(points)
}
