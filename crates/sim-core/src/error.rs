use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// None of the configured candidates resolved to an executable.
    #[error("simulator not found: {0}")]
    SimulatorNotFound(String),

    #[error("simulation timed out after {0} seconds")]
    SimulationTimeout(u64),

    #[error("simulator execution failed: {0}")]
    SimulatorExecutionFailure(String),

    #[error("invalid magnitude: {0:?}")]
    InvalidMagnitude(String),

    #[error("{analysis} analysis requires parameter '{name}'")]
    MissingParameter { analysis: String, name: String },

    #[error("invalid value for parameter '{name}': {value}")]
    InvalidParameter { name: String, value: String },

    #[error("unsupported analysis type: {0}")]
    UnsupportedAnalysis(String),

    #[error("temp file error: {0}")]
    TempFile(String),
}
