use crate::{nodes::NodeHandle, process::Control};
use chrono::Local;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    env, fs, io, mem,
    path::{Path, PathBuf},
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RunDirError {
    #[error("Run directory could not be created")]
    Create(#[from] io::Error),
}

/// one running sampler attached to one node
#[derive(Debug)]
pub struct LoggerProcess {
    pub control: Control,
    pub started: Instant,
}

/// Context of one supervised job invocation: the directory all artifacts land
/// in, the allocated nodes and the per-node sampler registry.
pub struct JobRun {
    id: String,
    dir: PathBuf,
    nodes: Vec<NodeHandle>,
    loggers: Mutex<BTreeMap<NodeHandle, LoggerProcess>>,
}

impl JobRun {
    /// create the run directory for a fresh timestamped run id
    pub fn create(base: &Path, nodes: Vec<NodeHandle>) -> Result<Self, RunDirError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let job = env::var("SLURM_JOB_ID").unwrap_or_else(|_| String::from("local"));

        Self::create_at(base, format!("run_{timestamp}_{job}"), nodes)
    }

    /// create (or reuse) the run directory `base`/`id`
    pub fn create_at(base: &Path, id: String, nodes: Vec<NodeHandle>) -> Result<Self, RunDirError> {
        let dir = base.join(&id);
        fs::create_dir_all(&dir)?;
        // remote launches resolve paths from other working directories
        let dir = dir.canonicalize()?;

        debug!(dir = ?dir, "Run directory is ready");

        Ok(Self {
            id,
            dir,
            nodes,
            loggers: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// csv the sampler on `node` writes into
    pub fn metrics_file(&self, node: &NodeHandle) -> PathBuf {
        self.dir.join(format!("system_metrics_{node}.csv"))
    }

    /// file capturing what the sampler on `node` prints
    pub fn logger_stdout(&self, node: &NodeHandle) -> PathBuf {
        self.dir.join(format!("logger_out_{node}.txt"))
    }

    pub fn logger_stderr(&self, node: &NodeHandle) -> PathBuf {
        self.dir.join(format!("logger_err_{node}.txt"))
    }

    /// summary the job tooling concatenates after the run
    pub fn summary_file(&self) -> PathBuf {
        self.dir.join("job_summary.txt")
    }

    /// remember the sampler running on `node`, at most one per node
    pub fn register(&self, node: NodeHandle, logger: LoggerProcess) {
        if let Some(previous) = self.loggers.lock().insert(node.clone(), logger) {
            warn!(
                node = %node,
                pid = previous.control.id(),
                "Replaced a sampler that was still registered"
            );
        }
    }

    /// number of currently registered samplers
    pub fn registered(&self) -> usize {
        self.loggers.lock().len()
    }

    /// hand out every registered sampler in node order
    pub fn drain(&self) -> Vec<(NodeHandle, LoggerProcess)> {
        let mut loggers = self.loggers.lock();

        mem::take(&mut *loggers).into_iter().collect()
    }
}
