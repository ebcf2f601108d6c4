//! Provenance records: which algorithms ran, with which parameters, and when.

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FrameworkError, Result};
use crate::kernel::property::Direction;

/// First line of the serialised history block.
pub const HISTORY_HEADER: &str = "Framework Version : ";

static NEXT_EXECUTION_ID: AtomicU64 = AtomicU64::new(1);

/// Ids issued after a history is read back must not reuse its ids.
fn restore_execution_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let id = u64::deserialize(deserializer)?;
    NEXT_EXECUTION_ID.fetch_max(id.saturating_add(1), Ordering::Relaxed);
    Ok(id)
}

/// Snapshot of a single property at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyHistory {
    pub name: String,
    pub value: String,
    pub is_default: bool,
    pub direction: Direction,
}

// ---------------------------------------------------------------------------
// AlgorithmHistory
// ---------------------------------------------------------------------------

/// One algorithm execution, with nested records of its child algorithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmHistory {
    name: String,
    version: u32,
    /// Lets merged histories drop duplicates.
    #[serde(deserialize_with = "restore_execution_id")]
    execution_id: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    parameters: Vec<PropertyHistory>,
    children: Vec<AlgorithmHistory>,
}

impl AlgorithmHistory {
    pub fn new(
        name: impl Into<String>,
        version: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        parameters: Vec<PropertyHistory>,
    ) -> Self {
        AlgorithmHistory {
            name: name.into(),
            version,
            execution_id: NEXT_EXECUTION_ID.fetch_add(1, Ordering::Relaxed),
            start,
            end,
            parameters,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Same id, name and start time: one execution reached us twice.
    fn same_execution(&self, other: &AlgorithmHistory) -> bool {
        self.execution_id == other.execution_id && self.start == other.start && self.name == other.name
    }

    pub fn execution_id(&self) -> u64 {
        self.execution_id
    }

    pub fn execution_start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn execution_end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn parameters(&self) -> &[PropertyHistory] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&PropertyHistory> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn add_child(&mut self, child: AlgorithmHistory) {
        self.children.push(child);
    }

    pub fn child_histories(&self) -> &[AlgorithmHistory] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Result<&AlgorithmHistory> {
        self.children.get(index).ok_or(FrameworkError::Index {
            index,
            len: self.children.len(),
        })
    }

    fn write_block(&self, out: &mut String, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        writeln!(out, "{pad}Algorithm: {} v{}", self.name, self.version)?;
        writeln!(out, "{pad}Execution Date: {}", format_time(self.start))?;
        writeln!(out, "{pad}End Date: {}", format_time(self.end))?;
        writeln!(out, "{pad}Execution Duration: {:.6} seconds", self.duration_secs())?;
        writeln!(out, "{pad}  Parameters:")?;
        for p in &self.parameters {
            writeln!(
                out,
                "{pad}    Name: {}, Value: {}, Default?: {}, Direction: {}",
                p.name,
                p.value,
                if p.is_default { "Yes" } else { "No" },
                p.direction.code()
            )?;
        }
        if !self.children.is_empty() {
            writeln!(out, "{pad}  Child algorithms:")?;
            for child in &self.children {
                child.write_block(out, indent + 4)?;
            }
        }
        Ok(())
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

impl fmt::Display for AlgorithmHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_block(&mut out, 0)?;
        f.write_str(&out)
    }
}

// ---------------------------------------------------------------------------
// WorkspaceHistory
// ---------------------------------------------------------------------------

/// Environment the history was recorded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentHistory {
    pub framework_version: String,
    pub os_name: String,
    pub os_arch: String,
}

impl Default for EnvironmentHistory {
    fn default() -> Self {
        EnvironmentHistory {
            framework_version: env!("CARGO_PKG_VERSION").to_string(),
            os_name: std::env::consts::OS.to_string(),
            os_arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Append-only, chronologically ordered list of algorithm executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceHistory {
    environment: EnvironmentHistory,
    algorithms: Vec<AlgorithmHistory>,
}

impl WorkspaceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(&self) -> &EnvironmentHistory {
        &self.environment
    }

    /// Add an entry, keeping completion order; an entry already present is ignored.
    pub fn add_history(&mut self, entry: AlgorithmHistory) {
        if self.algorithms.iter().any(|a| a.same_execution(&entry)) {
            return;
        }
        let pos = self
            .algorithms
            .partition_point(|a| (a.end, a.execution_id) <= (entry.end, entry.execution_id));
        self.algorithms.insert(pos, entry);
    }

    /// Merge another workspace's history into this one.
    pub fn add_histories(&mut self, other: &WorkspaceHistory) {
        for entry in &other.algorithms {
            self.add_history(entry.clone());
        }
    }

    pub fn contains(&self, execution_id: u64) -> bool {
        self.algorithms.iter().any(|a| a.execution_id == execution_id)
    }

    pub fn size(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    pub fn algorithm_histories(&self) -> &[AlgorithmHistory] {
        &self.algorithms
    }

    pub fn algorithm_history(&self, index: usize) -> Result<&AlgorithmHistory> {
        self.algorithms.get(index).ok_or(FrameworkError::Index {
            index,
            len: self.algorithms.len(),
        })
    }

    pub fn last_algorithm(&self) -> Option<&AlgorithmHistory> {
        self.algorithms.last()
    }

    /// Explicit history clearing; the only way entries are removed.
    pub fn clear(&mut self) {
        self.algorithms.clear();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl fmt::Display for WorkspaceHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        writeln!(out, "{HISTORY_HEADER}{}", self.environment.framework_version)?;
        writeln!(out, "OS name: {}", self.environment.os_name)?;
        writeln!(out, "OS arch: {}", self.environment.os_arch)?;
        for algorithm in &self.algorithms {
            writeln!(out)?;
            algorithm.write_block(&mut out, 0)?;
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(name: &str, end_offset_ms: i64) -> AlgorithmHistory {
        let start = Utc::now();
        AlgorithmHistory::new(
            name,
            1,
            start,
            start + Duration::milliseconds(end_offset_ms),
            vec![PropertyHistory {
                name: "OutputWorkspace".into(),
                value: "ws".into(),
                is_default: false,
                direction: Direction::Output,
            }],
        )
    }

    #[test]
    fn text_block_starts_with_header() {
        let mut h = WorkspaceHistory::new();
        h.add_history(entry("Rebin", 5));
        let text = h.to_string();
        assert!(text.starts_with(HISTORY_HEADER));
        assert!(text.contains("Algorithm: Rebin v1"));
        assert!(text.contains("Name: OutputWorkspace, Value: ws, Default?: No, Direction: 1"));
    }

    #[test]
    fn merging_drops_duplicates_and_keeps_order() {
        let first = entry("CreateWorkspace", 1);
        let second = entry("Rebin", 50);
        let mut a = WorkspaceHistory::new();
        a.add_history(first.clone());
        let mut b = WorkspaceHistory::new();
        b.add_history(first);
        b.add_history(second);

        a.add_histories(&b);
        assert_eq!(a.size(), 2);
        assert_eq!(a.algorithm_history(0).unwrap().name(), "CreateWorkspace");
        assert_eq!(a.algorithm_history(1).unwrap().name(), "Rebin");
        assert!(a.algorithm_history(2).is_err());
    }

    #[test]
    fn children_are_indented() {
        let mut parent = entry("RebinToWorkspace", 10);
        parent.add_child(entry("Rebin", 5));
        let text = parent.to_string();
        assert!(text.contains("  Child algorithms:\n    Algorithm: Rebin v1"));
        assert_eq!(parent.child(0).unwrap().name(), "Rebin");
    }

    #[test]
    fn entries_added_after_a_restore_are_kept() {
        let stored = entry("LoadSpectra", 1);
        let mut saved = WorkspaceHistory::new();
        saved.add_history(stored.clone());
        let mut json: serde_json::Value = serde_json::from_str(&saved.to_json().unwrap()).unwrap();
        // An id this process would otherwise hand out next.
        json["algorithms"][0]["execution_id"] = (stored.execution_id() + 1).into();

        let mut restored = WorkspaceHistory::from_json(&json.to_string()).unwrap();
        let fresh = entry("Rebin", 5);
        assert!(fresh.execution_id() > stored.execution_id() + 1);
        restored.add_history(fresh);
        assert_eq!(restored.size(), 2);
        assert_eq!(restored.last_algorithm().unwrap().name(), "Rebin");
    }
}
