use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Probed in order; bare names are searched on PATH.
    pub candidates: Vec<PathBuf>,
    pub timeout_secs: u64,
    /// Directory for temporary netlists; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                PathBuf::from("/usr/local/bin/ngspice"),
                PathBuf::from("/usr/bin/ngspice"),
                PathBuf::from("ngspice"),
            ],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            work_dir: None,
        }
    }
}

impl SimulatorConfig {
    /// Defaults overridden by `NGSPICE_PATH`, `NGSPICE_TIMEOUT_SECS` and
    /// `NGSPICE_WORK_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env::var_os("NGSPICE_PATH") {
            config.candidates.insert(0, PathBuf::from(path));
        }
        if let Ok(value) = env::var("NGSPICE_TIMEOUT_SECS") {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_secs = secs,
                _ => log::warn!("ignoring NGSPICE_TIMEOUT_SECS={:?}", value),
            }
        }
        if let Some(dir) = env::var_os("NGSPICE_WORK_DIR") {
            config.work_dir = Some(PathBuf::from(dir));
        }
        config
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates = vec![path.into()];
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
