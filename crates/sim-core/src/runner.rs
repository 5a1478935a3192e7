//! Simulator process runner.
//!
//! Writes the netlist to a temporary file, runs `<simulator> -b <file>` and
//! captures its output. The temporary file is a `NamedTempFile`, so it is
//! removed when `run` returns on every path, timeouts included.

use std::env;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::config::SimulatorConfig;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorRunner {
    executable: PathBuf,
    work_dir: Option<PathBuf>,
}

impl SimulatorRunner {
    /// Resolves the first usable candidate from `config`.
    pub fn locate(config: &SimulatorConfig) -> Result<Self> {
        for candidate in &config.candidates {
            if let Some(executable) = resolve_candidate(candidate) {
                log::debug!("simulator resolved to {}", executable.display());
                return Ok(Self {
                    executable,
                    work_dir: config.work_dir.clone(),
                });
            }
        }
        let tried: Vec<String> = config
            .candidates
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        Err(Error::SimulatorNotFound(format!("tried {}", tried.join(", "))))
    }

    pub fn with_executable(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match resolve_candidate(&path) {
            Some(executable) => Ok(Self {
                executable,
                work_dir: None,
            }),
            None => Err(Error::SimulatorNotFound(path.display().to_string())),
        }
    }

    /// Temporary netlists go to `dir` instead of the system temp dir.
    pub fn in_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// First line of `<simulator> -v` that names the program.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.executable)
            .arg("-v")
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Error::SimulatorExecutionFailure(err.to_string()))?;
        let text = String::from_utf8_lossy(&output.stdout);
        let line = text
            .lines()
            .map(|line| line.trim().trim_matches('*').trim())
            .find(|line| line.to_ascii_lowercase().contains("ngspice"))
            .or_else(|| text.lines().map(str::trim).find(|line| !line.is_empty()))
            .unwrap_or("unknown");
        Ok(line.to_string())
    }

    pub fn run(&self, netlist: &str, timeout: Duration) -> Result<RunOutput> {
        let mut netlist_file = self.create_netlist_file()?;
        netlist_file
            .write_all(netlist.as_bytes())
            .and_then(|_| netlist_file.flush())
            .map_err(|err| Error::TempFile(err.to_string()))?;

        log::info!(
            "running {} -b {}",
            self.executable.display(),
            netlist_file.path().display()
        );

        let mut child = Command::new(&self.executable)
            .arg("-b")
            .arg(netlist_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                Error::SimulatorExecutionFailure(format!(
                    "failed to start {}: {}",
                    self.executable.display(),
                    err
                ))
            })?;

        // Drain both pipes while waiting so a chatty simulator cannot block
        // on a full pipe and run into the timeout.
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = wait_with_timeout(&mut child, timeout)?;
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        log::debug!(
            "simulator exited with {} ({} bytes stdout, {} bytes stderr)",
            status,
            stdout.len(),
            stderr.len()
        );

        Ok(RunOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn create_netlist_file(&self) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sim-").suffix(".cir");
        let file = match &self.work_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        file.map_err(|err| Error::TempFile(err.to_string()))
    }
}

fn resolve_candidate(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    // Bare names are looked up on PATH.
    if candidate.components().count() != 1 || candidate.is_absolute() {
        return None;
    }
    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .map(|dir| dir.join(candidate))
        .find(|path| path.is_file())
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::warn!("simulator killed after {:?}", timeout);
                    return Err(Error::SimulationTimeout(timeout.as_secs()));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(Error::SimulatorExecutionFailure(err.to_string())),
        }
    }
}
