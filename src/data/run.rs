use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FrameworkError, Result};

/// Log holding the integrated proton charge of a run.
pub const PROTON_CHARGE_LOG: &str = "gd_prot_chrg";

// ---------------------------------------------------------------------------
// LogValue – scalar or time series sample log
// ---------------------------------------------------------------------------

/// Time-stamped numeric samples, e.g. a sample temperature log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    times: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, keeping samples ordered by time.
    pub fn add(&mut self, time: DateTime<Utc>, value: f64) {
        let pos = self.times.partition_point(|t| *t <= time);
        self.times.insert(pos, time);
        self.values.insert(pos, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn first_value(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Unweighted mean of all samples.
    pub fn mean(&self) -> Option<f64> {
        (!self.values.is_empty())
            .then(|| self.values.iter().sum::<f64>() / self.values.len() as f64)
    }
}

/// A single run log entry. Opaque to the framework beyond this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LogValue {
    Number(f64),
    Integer(i64),
    Text(String),
    TimeSeries(TimeSeries),
}

impl LogValue {
    /// Numeric view: scalars directly, time series by their mean.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LogValue::Number(v) => Some(*v),
            LogValue::Integer(i) => Some(*i as f64),
            LogValue::TimeSeries(ts) => ts.mean(),
            LogValue::Text(_) => None,
        }
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Number(v) => write!(f, "{v}"),
            LogValue::Integer(i) => write!(f, "{i}"),
            LogValue::Text(s) => write!(f, "{s}"),
            LogValue::TimeSeries(ts) => write!(f, "<time series: {} entries>", ts.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run – named log store attached to a workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    logs: BTreeMap<String, LogValue>,
}

impl Run {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.logs.contains_key(name)
    }

    pub fn get_property(&self, name: &str) -> Result<&LogValue> {
        self.logs
            .get(name)
            .ok_or_else(|| FrameworkError::NotFound(format!("log '{name}'")))
    }

    /// Add a log; an existing entry is only replaced when `overwrite` is set.
    pub fn add_property(&mut self, name: &str, value: LogValue, overwrite: bool) -> Result<()> {
        if !overwrite && self.logs.contains_key(name) {
            return Err(FrameworkError::DuplicateName(format!("log '{name}'")));
        }
        self.logs.insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove_property(&mut self, name: &str) -> Result<LogValue> {
        self.logs
            .remove(name)
            .ok_or_else(|| FrameworkError::NotFound(format!("log '{name}'")))
    }

    pub fn log_names(&self) -> impl Iterator<Item = &str> {
        self.logs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub fn proton_charge(&self) -> Result<f64> {
        self.get_property(PROTON_CHARGE_LOG)?
            .as_f64()
            .ok_or_else(|| FrameworkError::computation("proton charge log is not numeric"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn add_respects_overwrite_flag() {
        let mut run = Run::new();
        run.add_property("run_title", LogValue::Text("vanadium".into()), false)
            .unwrap();
        assert!(run
            .add_property("run_title", LogValue::Text("empty can".into()), false)
            .is_err());
        run.add_property("run_title", LogValue::Text("empty can".into()), true)
            .unwrap();
        assert_eq!(run.get_property("run_title").unwrap().to_string(), "empty can");
        assert!(matches!(run.get_property("temp"), Err(FrameworkError::NotFound(_))));
    }

    #[test]
    fn time_series_stays_ordered() {
        let mut ts = TimeSeries::new();
        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        ts.add(t(20), 2.0);
        ts.add(t(10), 1.0);
        ts.add(t(30), 6.0);
        assert_eq!(ts.values(), &[1.0, 2.0, 6.0]);
        assert_eq!(ts.mean(), Some(3.0));

        let mut run = Run::new();
        run.add_property(PROTON_CHARGE_LOG, LogValue::TimeSeries(ts), false)
            .unwrap();
        assert_eq!(run.proton_charge().unwrap(), 3.0);
    }
}
