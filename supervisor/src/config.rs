use crate::process::StopPolicy;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read the config file")]
    Read(#[from] io::Error),
    #[error("The config file is not valid yaml")]
    Parse(#[from] serde_yaml::Error),
    #[error("There is no fan-out strategy with this name")]
    UnsupportedFanout(String),
}

/// Top level config of the supervisor
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    // How sampler processes reach the allocated nodes
    pub fanout: FanoutConfig,
    // The sampler command started on every node
    #[serde(default)]
    pub logger: LoggerConfig,
    // How long a sampler may linger after the interrupt
    #[serde(default)]
    pub stop: StopConfig,
    // Directory the per-run directories are created under
    #[serde(default = "default_runs")]
    pub runs: PathBuf,
}

impl SupervisorConfig {
    /// Load the config from a yaml file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;

        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Nodes pinned in the strategy parameters, if there are any
    pub fn fanout_nodes(&self) -> Option<Vec<String>> {
        let nodes = self.fanout.parameter.get("nodes")?.as_sequence()?;

        nodes
            .iter()
            .map(|entry| entry.as_str().map(String::from))
            .collect()
    }

    /// Strategy parameter overriding the program behind `key`
    pub fn fanout_program(&self, key: &str) -> Option<String> {
        self.fanout
            .parameter
            .get(key)
            .and_then(|value| value.as_str())
            .map(String::from)
    }

    /// Returns true if the config contains an error
    pub fn preflight_checks(&mut self) -> bool {
        let mut contains_error = false;

        self.fanout.name = self.fanout.name.to_lowercase();
        if !matches!(self.fanout.name.as_str(), "local" | "ssh" | "srun") {
            error!(strategy = %self.fanout.name, "There is no such fan-out strategy");
            contains_error = true;
        }

        if self.logger.interval == 0 {
            error!("The sampling interval must be at least one second");
            contains_error = true;
        }

        if self.stop.timeout == 0 {
            error!("The stop timeout must be at least one second");
            contains_error = true;
        }

        if self.fanout.parameter.contains_key("nodes") {
            match self.fanout_nodes() {
                Some(nodes) if is_name_list(&nodes) => {
                    if self.fanout.name == "local" && nodes.len() > 1 {
                        error!("The local strategy cannot sample more than one pinned node");
                        contains_error = true;
                    }
                }
                _ => {
                    error!("The pinned nodes must be a list of plain node names");
                    contains_error = true;
                }
            }
        }

        if self.fanout.name == "local" && !check_executable(Path::new(&self.logger.exec)) {
            contains_error = true;
        }

        contains_error
    }
}

/// Selects and parameterizes the per-node launch strategy
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FanoutConfig {
    // Name of the strategy (local, ssh or srun)
    pub name: String,
    // Free form parameters of the strategy
    #[serde(default)]
    pub parameter: BTreeMap<String, serde_yaml::Value>,
}

/// The metrics sampler launched on each node
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    // Executable, bare names are resolved through PATH on the target node
    #[serde(default = "default_logger_exec")]
    pub exec: String,
    // Seconds between two samples
    #[serde(default = "default_interval")]
    pub interval: u64,
    // Extra params appended to the sampler command line
    #[serde(default)]
    pub params: Vec<String>,
}

impl LoggerConfig {
    /// command line of a sampler writing into `metrics`
    pub fn argv(&self, metrics: &Path) -> Vec<String> {
        let mut argv = vec![
            self.exec.clone(),
            String::from("--output"),
            metrics.to_string_lossy().into_owned(),
            String::from("--interval"),
            self.interval.to_string(),
        ];
        argv.extend(self.params.iter().cloned());

        argv
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            exec: default_logger_exec(),
            interval: default_interval(),
            params: Vec::new(),
        }
    }
}

/// Bounds of the graceful stop
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopConfig {
    // Seconds between the interrupt and the forced kill
    #[serde(default = "default_stop_timeout")]
    pub timeout: u64,
}

impl StopConfig {
    pub fn policy(&self) -> StopPolicy {
        StopPolicy::with_timeout(Duration::from_secs(self.timeout))
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            timeout: default_stop_timeout(),
        }
    }
}

/// Returns true if `exec` looks runnable from here
fn check_executable(exec: &Path) -> bool {
    if exec.components().count() < 2 {
        // bare names are left to the PATH lookup at launch
        return true;
    }

    match fs::metadata(exec) {
        Ok(meta) if meta.is_file() && meta.permissions().mode() & 0o111 != 0 => true,
        Ok(_) => {
            error!(exec = ?exec, "The sampler executable is not an executable file");
            false
        }
        Err(error) => {
            error!(error = ?error, exec = ?exec, "The sampler executable is missing");
            false
        }
    }
}

fn is_name_list(nodes: &[String]) -> bool {
    !nodes.is_empty() && nodes.iter().all(|node| is_node_name(node))
}

// names flow into file names and remote command lines
fn is_node_name(name: &str) -> bool {
    let mut characters = name.chars();

    matches!(characters.next(), Some(first) if first.is_ascii_alphanumeric())
        && characters.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

fn default_runs() -> PathBuf {
    PathBuf::from(".")
}

fn default_logger_exec() -> String {
    String::from("nosy-logger")
}

fn default_interval() -> u64 {
    5
}

fn default_stop_timeout() -> u64 {
    5
}
