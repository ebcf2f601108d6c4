//! Property validators.
//!
//! A validator inspects a candidate [`PropertyValue`] and returns a
//! human-readable message when it is unacceptable. Single-value validators
//! run on every `set`. A [`CrossValidator`] registered on a
//! [`PropertyManager`] inspects several properties at once and runs in
//! `validate_all`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::data::workspace::{MatrixWorkspace, Workspace};
use crate::kernel::property::PropertyValue;
use crate::kernel::property_manager::PropertyManager;

/// Predicate over a property value: `Err(message)` when invalid.
pub trait Validator: Send + Sync + fmt::Debug {
    fn check(&self, value: &PropertyValue) -> Result<(), String>;

    /// Values this validator accepts, when it enumerates them.
    fn allowed_values(&self) -> Vec<String> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Scalar validators
// ---------------------------------------------------------------------------

/// Rejects empty values.
#[derive(Debug, Default, Clone, Copy)]
pub struct MandatoryValidator;

impl Validator for MandatoryValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        if value.is_empty() {
            Err("A value must be entered for this parameter".to_string())
        } else {
            Ok(())
        }
    }
}

/// Inclusive (or exclusive) lower/upper bound on a numeric value.
///
/// Array values are checked element by element.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundedValidator {
    lower: Option<f64>,
    upper: Option<f64>,
    exclusive: bool,
}

impl BoundedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lower(mut self, lower: f64) -> Self {
        self.lower = Some(lower);
        self
    }

    pub fn upper(mut self, upper: f64) -> Self {
        self.upper = Some(upper);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        Self::new().lower(lower).upper(upper)
    }
}

impl Validator for BoundedValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        for v in value.numeric_elements() {
            if let Some(lo) = self.lower {
                if v < lo || (self.exclusive && v == lo) {
                    let op = if self.exclusive { "<=" } else { "<" };
                    return Err(format!("Selected value {v} is {op} the lower bound ({lo})"));
                }
            }
            if let Some(hi) = self.upper {
                if v > hi || (self.exclusive && v == hi) {
                    let op = if self.exclusive { ">=" } else { ">" };
                    return Err(format!("Selected value {v} is {op} the upper bound ({hi})"));
                }
            }
        }
        Ok(())
    }
}

/// Restricts a string value to a fixed set of options.
#[derive(Debug, Clone)]
pub struct ListValidator {
    allowed: Vec<String>,
}

impl ListValidator {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ListValidator {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for ListValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        let text = value.to_string();
        if self.allowed.iter().any(|a| *a == text) {
            Ok(())
        } else {
            Err(format!(
                "The value \"{text}\" is not in the list of allowed values"
            ))
        }
    }

    fn allowed_values(&self) -> Vec<String> {
        self.allowed.clone()
    }
}

/// Constrains the number of elements in an array value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayLengthValidator {
    min: Option<usize>,
    max: Option<usize>,
}

impl ArrayLengthValidator {
    pub fn exact(len: usize) -> Self {
        ArrayLengthValidator {
            min: Some(len),
            max: Some(len),
        }
    }

    pub fn range(min: usize, max: usize) -> Self {
        ArrayLengthValidator {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: usize) -> Self {
        ArrayLengthValidator {
            min: Some(min),
            max: None,
        }
    }
}

impl Validator for ArrayLengthValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        let len = value.len();
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo == hi && len != lo => {
                Err(format!("Incorrect size: expected {lo} values, got {len}"))
            }
            (Some(lo), _) if len < lo => {
                Err(format!("Incorrect size: expected at least {lo} values, got {len}"))
            }
            (_, Some(hi)) if len > hi => {
                Err(format!("Incorrect size: expected at most {hi} values, got {len}"))
            }
            _ => Ok(()),
        }
    }
}

/// Checks a rebin parameter list `x1, dx1, x2[, dx2, x3 ...]` or a lone width.
#[derive(Debug, Default, Clone, Copy)]
pub struct RebinParamsValidator {
    allow_empty: bool,
}

impl RebinParamsValidator {
    pub fn allow_empty() -> Self {
        RebinParamsValidator { allow_empty: true }
    }
}

impl Validator for RebinParamsValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        let params = value.numeric_elements();
        if params.is_empty() {
            return if self.allow_empty {
                Ok(())
            } else {
                Err("Enter values for this property".to_string())
            };
        }
        if params.len() == 1 {
            return if params[0] == 0.0 {
                Err("Cannot have a zero bin width".to_string())
            } else {
                Ok(())
            };
        }
        if params.len() % 2 == 0 {
            return Err(
                "The number of bin boundary parameters provided must be odd".to_string(),
            );
        }
        if params.iter().skip(1).step_by(2).any(|&dx| dx == 0.0) {
            return Err("Cannot have a zero bin width".to_string());
        }
        let increasing = params
            .iter()
            .step_by(2)
            .collect::<Vec<_>>()
            .windows(2)
            .all(|w| w[1] > w[0]);
        if !increasing {
            return Err(
                "Bin boundary values must be given in order of increasing value".to_string(),
            );
        }
        Ok(())
    }
}

/// All inner validators must pass; the first failure is reported.
#[derive(Debug, Default, Clone)]
pub struct CompositeValidator {
    inner: Vec<Arc<dyn Validator>>,
}

impl CompositeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.inner.push(Arc::new(validator));
        self
    }
}

impl Validator for CompositeValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        self.inner.iter().try_for_each(|v| v.check(value))
    }

    fn allowed_values(&self) -> Vec<String> {
        self.inner
            .iter()
            .flat_map(|v| v.allowed_values())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Workspace validators
// ---------------------------------------------------------------------------

/// Run `f` against the matrix workspace held by `value`.
///
/// Unresolved workspace values pass: the name is resolved and re-checked
/// before execution.
fn with_matrix(
    value: &PropertyValue,
    f: impl FnOnce(&MatrixWorkspace) -> Result<(), String>,
) -> Result<(), String> {
    let PropertyValue::Workspace(w) = value else {
        return Err("A workspace is required".to_string());
    };
    match &w.handle {
        None => Ok(()),
        Some(Workspace::Matrix(handle)) => f(&handle.read()),
        Some(Workspace::Group(_)) => Err("A matrix workspace is required, got a group".to_string()),
    }
}

/// Requires histogram (or, inverted, point) data.
#[derive(Debug, Clone, Copy)]
pub struct HistogramValidator {
    must_be_histogram: bool,
}

impl HistogramValidator {
    pub fn new() -> Self {
        HistogramValidator {
            must_be_histogram: true,
        }
    }

    pub fn points() -> Self {
        HistogramValidator {
            must_be_histogram: false,
        }
    }
}

impl Default for HistogramValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for HistogramValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        with_matrix(value, |ws| match (self.must_be_histogram, ws.is_histogram_data()) {
            (true, false) => Err("The workspace must contain histogram data".to_string()),
            (false, true) => Err("The workspace must contain point data".to_string()),
            _ => Ok(()),
        })
    }
}

/// Requires raw counts (or, inverted, distribution data).
#[derive(Debug, Clone, Copy)]
pub struct RawCountValidator {
    must_be_counts: bool,
}

impl RawCountValidator {
    pub fn new() -> Self {
        RawCountValidator {
            must_be_counts: true,
        }
    }

    pub fn distribution() -> Self {
        RawCountValidator {
            must_be_counts: false,
        }
    }
}

impl Default for RawCountValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for RawCountValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        with_matrix(value, |ws| match (self.must_be_counts, ws.is_distribution()) {
            (true, true) => {
                Err("A workspace containing numbers of counts is required here".to_string())
            }
            (false, false) => {
                Err("A workspace of numbers of counts is not allowed here".to_string())
            }
            _ => Ok(()),
        })
    }
}

/// Requires every spectrum to share the same X values.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommonBinsValidator;

impl Validator for CommonBinsValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        with_matrix(value, |ws| {
            if ws.has_common_bins() {
                Ok(())
            } else {
                Err("The workspace must have common bin boundaries for all histograms".to_string())
            }
        })
    }
}

/// Requires an attached instrument.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstrumentValidator;

impl Validator for InstrumentValidator {
    fn check(&self, value: &PropertyValue) -> Result<(), String> {
        with_matrix(value, |ws| {
            if ws.instrument().is_some() {
                Ok(())
            } else {
                Err("The workspace must have an instrument defined".to_string())
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Cross-property validators
// ---------------------------------------------------------------------------

/// Check over a combination of properties; maps property name to message.
pub trait CrossValidator: Send + Sync + fmt::Debug {
    fn check(&self, props: &PropertyManager) -> BTreeMap<String, String>;
}

/// `lower < upper` for two double properties. Reported against `upper`.
#[derive(Debug, Clone)]
pub struct OrderedPair {
    lower: String,
    upper: String,
}

impl OrderedPair {
    pub fn new(lower: &str, upper: &str) -> Self {
        OrderedPair {
            lower: lower.to_string(),
            upper: upper.to_string(),
        }
    }
}

impl CrossValidator for OrderedPair {
    fn check(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        let mut violations = BTreeMap::new();
        if let (Ok(lo), Ok(hi)) = (
            props.get_property::<f64>(&self.lower),
            props.get_property::<f64>(&self.upper),
        ) {
            // NaN (unset) compares false and passes here.
            if lo >= hi {
                violations.insert(
                    self.upper.clone(),
                    format!("{} must be greater than {}", self.upper, self.lower),
                );
            }
        }
        violations
    }
}

/// Workspace-index bounds where a negative end means "last spectrum".
#[derive(Debug, Clone)]
pub struct IndexOrder {
    start: String,
    end: String,
}

impl IndexOrder {
    pub fn new(start: &str, end: &str) -> Self {
        IndexOrder {
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

impl CrossValidator for IndexOrder {
    fn check(&self, props: &PropertyManager) -> BTreeMap<String, String> {
        let mut violations = BTreeMap::new();
        if let (Ok(s), Ok(e)) = (
            props.get_property::<i64>(&self.start),
            props.get_property::<i64>(&self.end),
        ) {
            if e >= 0 && e < s {
                violations.insert(
                    self.end.clone(),
                    format!("{} must not be less than {}", self.end, self.start),
                );
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_message_names_the_bound() {
        let v = BoundedValidator::between(1.0, 10.0);
        let err = v.check(&PropertyValue::Int(12)).unwrap_err();
        assert!(err.contains("upper bound (10)"), "{err}");
        let err = v.check(&PropertyValue::Double(0.5)).unwrap_err();
        assert!(err.contains("lower bound (1)"), "{err}");
        assert!(v.check(&PropertyValue::Int(10)).is_ok());
    }

    #[test]
    fn exclusive_bound_rejects_the_bound_itself() {
        let v = BoundedValidator::new().lower(0.0).exclusive();
        assert!(v.check(&PropertyValue::Double(0.0)).is_err());
        assert!(v.check(&PropertyValue::Double(1e-9)).is_ok());
    }

    #[test]
    fn rebin_params_rules() {
        let v = RebinParamsValidator::default();
        let check = |p: Vec<f64>| v.check(&PropertyValue::DoubleArray(p));
        assert!(check(vec![0.0, 1.0, 10.0]).is_ok());
        assert!(check(vec![2.0]).is_ok());
        assert!(check(vec![0.0, 1.0]).unwrap_err().contains("must be odd"));
        assert!(check(vec![0.0, 0.0, 10.0]).unwrap_err().contains("zero bin width"));
        assert!(check(vec![10.0, 1.0, 0.0]).unwrap_err().contains("increasing"));
        assert!(check(vec![]).is_err());
    }

    #[test]
    fn list_validator_reports_allowed_values() {
        let v = ListValidator::new(["Linear", "Logarithmic"]);
        assert!(v.check(&PropertyValue::Str("Linear".into())).is_ok());
        assert!(v.check(&PropertyValue::Str("Cubic".into())).is_err());
        assert_eq!(v.allowed_values().len(), 2);
    }

    #[test]
    fn composite_reports_first_failure() {
        let v = CompositeValidator::new()
            .with(MandatoryValidator)
            .with(ArrayLengthValidator::at_least(3));
        assert_eq!(
            v.check(&PropertyValue::IntArray(vec![])).unwrap_err(),
            "A value must be entered for this parameter"
        );
        assert!(v.check(&PropertyValue::IntArray(vec![1, 2])).is_err());
        assert!(v.check(&PropertyValue::IntArray(vec![1, 2, 3])).is_ok());
    }
}
