use crate::run::JobRun;
use globset::{GlobBuilder, GlobMatcher};
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::{fs, path::PathBuf};
use tracing::warn;
use tracing_unwrap::ResultExt;

static METRICS_GLOB: Lazy<GlobMatcher> = Lazy::new(|| {
    GlobBuilder::new("system_metrics_*.csv")
        .build()
        .unwrap_or_log()
        .compile_matcher()
});

/// What the run directory ended up containing, node by node
#[derive(Debug, Default)]
pub struct ArtifactReport {
    // nodes whose metrics file is there and holds data
    pub complete: Vec<String>,
    // nodes whose metrics file never appeared
    pub missing: Vec<String>,
    // nodes whose metrics file exists but contains nothing
    pub empty: Vec<String>,
}

impl ArtifactReport {
    /// true when every node delivered a non empty metrics file
    pub fn clean(&self) -> bool {
        self.missing.is_empty() && self.empty.is_empty()
    }
}

/// Walk the run directory and report which allocated nodes delivered their
/// metrics file, which never did and which left an empty one behind.
pub fn verify(run: &JobRun) -> ArtifactReport {
    let found = WalkBuilder::new(run.dir())
        .max_depth(Some(1))
        .standard_filters(false)
        .build()
        .filter_map(Result::ok)
        .map(DirEntry::into_path)
        .filter(|path| {
            path.is_file()
                && matches!(path.file_name(), Some(name) if METRICS_GLOB.is_match(name))
        })
        .collect_vec();

    let mut report = ArtifactReport::default();
    for node in run.nodes() {
        let metrics = run.metrics_file(node);
        if !found.contains(&metrics) {
            warn!(node = %node, "No metrics were collected on this node");
            report.missing.push(node.as_str().to_string());
            continue;
        }

        if file_size(&metrics) == 0 {
            warn!(node = %node, "The metrics file of this node is empty");
            report.empty.push(node.as_str().to_string());
        } else {
            report.complete.push(node.as_str().to_string());
        }
    }
    report.complete.sort_unstable();

    report
}

fn file_size(path: &PathBuf) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}
