use itertools::Itertools;
use std::{env, ffi::OsString, fmt, mem};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Hostname could not be retrieved")]
    Hostname(#[from] nix::errno::Errno),
    #[error("Hostname is not valid utf-8")]
    HostnameEncoding(OsString),
    #[error("Node list could not be parsed")]
    Nodelist(String),
}

/// name of one allocated execution node
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeHandle(String);

impl NodeHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeHandle {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for NodeHandle {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// nodes of the current scheduler allocation, falling back to the local host
pub fn allocated_nodes() -> Result<Vec<NodeHandle>, AllocationError> {
    match env::var("SLURM_JOB_NODELIST") {
        Ok(list) if !list.is_empty() => {
            let nodes = expand_nodelist(&list)?;
            debug!(nodes = ?nodes, "Expanded the scheduler allocation from SLURM_JOB_NODELIST");

            Ok(nodes)
        }
        _ => {
            let node = local_node()?;
            debug!(node = %node, "No scheduler allocation found, supervising the local host only");

            Ok(vec![node])
        }
    }
}

/// handle of the host the supervisor itself runs on
pub fn local_node() -> Result<NodeHandle, AllocationError> {
    match nix::unistd::gethostname() {
        Ok(hostname) => hostname
            .into_string()
            .map(NodeHandle)
            .map_err(AllocationError::HostnameEncoding),
        Err(error) => {
            error!(error = ?error, "Failed to retrieve the hostname of this node: {error}");

            Err(AllocationError::Hostname(error))
        }
    }
}

/// expand a compressed scheduler node list like `n[01-03,05],login0`
/// ranges keep the zero padding of their start token, duplicates are dropped
pub fn expand_nodelist(list: &str) -> Result<Vec<NodeHandle>, AllocationError> {
    let mut nodes = Vec::new();

    for entry in split_entries(list)? {
        expand_entry(&entry, &mut nodes)?;
    }

    Ok(nodes.into_iter().unique().collect_vec())
}

/// split on commas that sit outside of bracket groups
fn split_entries(list: &str) -> Result<Vec<String>, AllocationError> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for character in list.chars() {
        match character {
            '[' => {
                depth += 1;
                current.push(character);
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| AllocationError::Nodelist(format!("stray `]` in {list}")))?;
                current.push(character);
            }
            ',' if depth == 0 => {
                entries.push(mem::take(&mut current));
            }
            _ => current.push(character),
        }
    }

    if depth != 0 {
        return Err(AllocationError::Nodelist(format!("unclosed `[` in {list}")));
    }

    entries.push(current);

    Ok(entries)
}

/// expand one entry, multiplying out every bracket group it contains
fn expand_entry(entry: &str, nodes: &mut Vec<NodeHandle>) -> Result<(), AllocationError> {
    if entry.is_empty() {
        return Err(AllocationError::Nodelist(String::from("empty entry")));
    }

    let mut expanded = vec![String::new()];
    let mut rest = entry;

    while let Some(open) = rest.find('[') {
        let close = rest
            .find(']')
            .filter(|close| *close > open)
            .ok_or_else(|| AllocationError::Nodelist(format!("unmatched `[` in {entry}")))?;

        for name in expanded.iter_mut() {
            name.push_str(&rest[..open]);
        }

        let numbers = expand_ranges(&rest[open + 1..close], entry)?;
        expanded = expanded
            .iter()
            .cartesian_product(numbers.iter())
            .map(|(name, number)| format!("{name}{number}"))
            .collect_vec();

        rest = &rest[close + 1..];
    }

    for name in expanded.iter_mut() {
        name.push_str(rest);
    }

    nodes.extend(expanded.into_iter().map(NodeHandle));

    Ok(())
}

/// expand a bracket group body like `01-03,05` into padded number strings
fn expand_ranges(group: &str, entry: &str) -> Result<Vec<String>, AllocationError> {
    let mut numbers = Vec::new();

    for part in group.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let width = start.len();
                let start = parse_index(start, entry)?;
                let end = parse_index(end, entry)?;

                if end < start {
                    return Err(AllocationError::Nodelist(format!(
                        "reversed range {part} in {entry}"
                    )));
                }

                for number in start..=end {
                    numbers.push(format!("{number:0width$}"));
                }
            }
            None => {
                parse_index(part, entry)?;
                numbers.push(part.to_owned());
            }
        }
    }

    Ok(numbers)
}

fn parse_index(token: &str, entry: &str) -> Result<u64, AllocationError> {
    token
        .parse()
        .map_err(|_| AllocationError::Nodelist(format!("invalid number `{token}` in {entry}")))
}
