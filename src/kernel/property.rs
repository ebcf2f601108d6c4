use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::history::PropertyHistory;
use crate::data::workspace::{GroupHandle, MatrixHandle, MatrixWorkspace, Workspace};
use crate::error::{FrameworkError, Result};
use crate::kernel::validators::Validator;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Data flow direction of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
    InOut,
}

impl Direction {
    /// Numeric code used by the history text format.
    pub fn code(self) -> u8 {
        match self {
            Direction::Input => 0,
            Direction::Output => 1,
            Direction::InOut => 2,
        }
    }

    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::InOut)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "Input"),
            Direction::Output => write!(f, "Output"),
            Direction::InOut => write!(f, "InOut"),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyValue – a single typed property cell
// ---------------------------------------------------------------------------

/// Type tag of a declared property; fixes how strings are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Bool,
    Int,
    Double,
    Str,
    IntArray,
    DoubleArray,
    StrArray,
    Workspace,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropertyKind::Bool => "boolean",
            PropertyKind::Int => "integer",
            PropertyKind::Double => "number",
            PropertyKind::Str => "string",
            PropertyKind::IntArray => "list of integers",
            PropertyKind::DoubleArray => "list of numbers",
            PropertyKind::StrArray => "list of strings",
            PropertyKind::Workspace => "workspace",
        };
        write!(f, "{s}")
    }
}

/// A workspace reference held by a property: the data-service name and,
/// once resolved or produced, the handle itself.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceValue {
    pub name: String,
    pub handle: Option<Workspace>,
}

impl WorkspaceValue {
    pub fn named(name: impl Into<String>) -> Self {
        WorkspaceValue {
            name: name.into(),
            handle: None,
        }
    }
}

impl PartialEq for WorkspaceValue {
    fn eq(&self, other: &Self) -> bool {
        let same_handle = match (&self.handle, &other.handle) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        self.name == other.name && same_handle
    }
}

/// A dynamically-typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    StrArray(Vec<String>),
    Workspace(WorkspaceValue),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Double(_) => PropertyKind::Double,
            PropertyValue::Str(_) => PropertyKind::Str,
            PropertyValue::IntArray(_) => PropertyKind::IntArray,
            PropertyValue::DoubleArray(_) => PropertyKind::DoubleArray,
            PropertyValue::StrArray(_) => PropertyKind::StrArray,
            PropertyValue::Workspace(_) => PropertyKind::Workspace,
        }
    }

    /// Parse a string into a value of the given kind.
    pub fn parse(kind: PropertyKind, text: &str) -> Result<Self> {
        let text = text.trim();
        let fail = || FrameworkError::Parse {
            value: text.to_string(),
            expected: kind.to_string(),
        };
        let value = match kind {
            PropertyKind::Bool => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => PropertyValue::Bool(true),
                "0" | "false" | "no" | "off" => PropertyValue::Bool(false),
                _ => return Err(fail()),
            },
            PropertyKind::Int => PropertyValue::Int(text.parse().map_err(|_| fail())?),
            PropertyKind::Double => PropertyValue::Double(text.parse().map_err(|_| fail())?),
            PropertyKind::Str => PropertyValue::Str(text.to_string()),
            PropertyKind::IntArray => PropertyValue::IntArray(parse_int_list(text)?),
            PropertyKind::DoubleArray => PropertyValue::DoubleArray(
                split_list(text)
                    .map(|tok| tok.parse::<f64>().map_err(|_| fail()))
                    .collect::<Result<_>>()?,
            ),
            PropertyKind::StrArray => {
                PropertyValue::StrArray(split_list(text).map(str::to_string).collect())
            }
            PropertyKind::Workspace => PropertyValue::Workspace(WorkspaceValue::named(text)),
        };
        Ok(value)
    }

    /// Whether the value counts as "not entered" for mandatory checks.
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::Bool(_) | PropertyValue::Int(_) => false,
            PropertyValue::Double(v) => v.is_nan(),
            PropertyValue::Str(s) => s.is_empty(),
            PropertyValue::IntArray(v) => v.is_empty(),
            PropertyValue::DoubleArray(v) => v.is_empty(),
            PropertyValue::StrArray(v) => v.is_empty(),
            PropertyValue::Workspace(w) => w.name.is_empty() && w.handle.is_none(),
        }
    }

    /// Try to interpret the value as an `f64` for bound checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(v) => Some(*v),
            PropertyValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Numeric elements of scalar or array values.
    pub fn numeric_elements(&self) -> Vec<f64> {
        match self {
            PropertyValue::Double(v) => vec![*v],
            PropertyValue::Int(i) => vec![*i as f64],
            PropertyValue::IntArray(v) => v.iter().map(|&i| i as f64).collect(),
            PropertyValue::DoubleArray(v) => v.clone(),
            _ => Vec::new(),
        }
    }

    /// Number of elements for array values, 1 for scalars.
    pub fn len(&self) -> usize {
        match self {
            PropertyValue::IntArray(v) => v.len(),
            PropertyValue::DoubleArray(v) => v.len(),
            PropertyValue::StrArray(v) => v.len(),
            _ => 1,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        }
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", if *b { "1" } else { "0" }),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Str(s) => write!(f, "{s}"),
            PropertyValue::IntArray(v) => write!(f, "{}", join(v)),
            PropertyValue::DoubleArray(v) => write!(f, "{}", join(v)),
            PropertyValue::StrArray(v) => write!(f, "{}", v.join(",")),
            PropertyValue::Workspace(w) => write!(f, "{}", w.name),
        }
    }
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Upper bound on the number of values a list may expand to.
pub const MAX_LIST_ENTRIES: usize = 10_000_000;

/// Parse a comma separated integer list; `a-b` expands to an inclusive range.
pub fn parse_int_list(text: &str) -> Result<Vec<i64>> {
    let mut out = Vec::new();
    for tok in split_list(text) {
        let fail = || FrameworkError::Parse {
            value: tok.to_string(),
            expected: PropertyKind::IntArray.to_string(),
        };
        // A leading '-' is a sign, not a range separator.
        match tok.char_indices().skip(1).find(|(_, c)| *c == '-').map(|(i, _)| i) {
            Some(split) => {
                let lo: i64 = tok[..split].trim().parse().map_err(|_| fail())?;
                let hi: i64 = tok[split + 1..].trim().parse().map_err(|_| fail())?;
                let span = hi.checked_sub(lo).ok_or_else(fail)?;
                if span < 0 || out.len() as u64 + span as u64 >= MAX_LIST_ENTRIES as u64 {
                    return Err(fail());
                }
                out.extend(lo..=hi);
            }
            None => out.push(tok.parse().map_err(|_| fail())?),
        }
        if out.len() > MAX_LIST_ENTRIES {
            return Err(fail());
        }
    }
    Ok(out)
}

// -- Conversions into PropertyValue --

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(v: usize) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(v: Vec<i64>) -> Self {
        PropertyValue::IntArray(v)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        PropertyValue::DoubleArray(v)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        PropertyValue::StrArray(v)
    }
}

impl From<Workspace> for PropertyValue {
    fn from(ws: Workspace) -> Self {
        PropertyValue::Workspace(WorkspaceValue {
            name: String::new(),
            handle: Some(ws),
        })
    }
}

impl From<MatrixHandle> for PropertyValue {
    fn from(ws: MatrixHandle) -> Self {
        Workspace::Matrix(ws).into()
    }
}

impl From<MatrixWorkspace> for PropertyValue {
    fn from(ws: MatrixWorkspace) -> Self {
        Workspace::from_matrix(ws).into()
    }
}

// -- Conversions out of PropertyValue --

/// Types that can be read back out of a [`PropertyValue`].
pub trait FromPropertyValue: Sized {
    fn from_property(value: &PropertyValue) -> Option<Self>;
}

impl FromPropertyValue for PropertyValue {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromPropertyValue for bool {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromPropertyValue for i64 {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromPropertyValue for usize {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromPropertyValue for f64 {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromPropertyValue for String {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Str(s) => Some(s.clone()),
            PropertyValue::Workspace(w) => Some(w.name.clone()),
            _ => None,
        }
    }
}

impl FromPropertyValue for Vec<i64> {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::IntArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromPropertyValue for Vec<f64> {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::DoubleArray(v) => Some(v.clone()),
            PropertyValue::IntArray(v) => Some(v.iter().map(|&i| i as f64).collect()),
            _ => None,
        }
    }
}

impl FromPropertyValue for Vec<String> {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::StrArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromPropertyValue for Workspace {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Workspace(w) => w.handle.clone(),
            _ => None,
        }
    }
}

impl FromPropertyValue for MatrixHandle {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        Workspace::from_property(value).and_then(|ws| ws.as_matrix().cloned())
    }
}

impl FromPropertyValue for GroupHandle {
    fn from_property(value: &PropertyValue) -> Option<Self> {
        Workspace::from_property(value).and_then(|ws| ws.as_group().cloned())
    }
}

// ---------------------------------------------------------------------------
// Property – a named, validated, directional value
// ---------------------------------------------------------------------------

/// A declared property of an algorithm or other configurable unit.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    doc: String,
    direction: Direction,
    value: PropertyValue,
    default: PropertyValue,
    is_default: bool,
    validator: Option<Arc<dyn Validator>>,
    /// Workspace properties only: an empty name is acceptable.
    optional: bool,
}

impl Property {
    pub fn new(
        name: impl Into<String>,
        default: impl Into<PropertyValue>,
        direction: Direction,
    ) -> Self {
        let default = default.into();
        Property {
            name: name.into(),
            doc: String::new(),
            direction,
            value: default.clone(),
            default,
            is_default: true,
            validator: None,
            optional: false,
        }
    }

    /// A workspace property whose value is the data-service name `default_name`.
    pub fn workspace(name: impl Into<String>, default_name: &str, direction: Direction) -> Self {
        Property::new(
            name,
            PropertyValue::Workspace(WorkspaceValue::named(default_name)),
            direction,
        )
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> PropertyKind {
        self.default.kind()
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    pub fn default_value(&self) -> &PropertyValue {
        &self.default
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    pub fn is_workspace(&self) -> bool {
        self.kind() == PropertyKind::Workspace
    }

    /// The workspace value, if this is a workspace property.
    pub fn workspace_value(&self) -> Option<&WorkspaceValue> {
        match &self.value {
            PropertyValue::Workspace(w) => Some(w),
            _ => None,
        }
    }

    /// Attach a resolved handle without touching the default flag.
    pub(crate) fn resolve_workspace(&mut self, ws: Workspace) {
        if let PropertyValue::Workspace(w) = &mut self.value {
            w.handle = Some(ws);
        }
    }

    pub(crate) fn clear_workspace_handle(&mut self) {
        if let PropertyValue::Workspace(w) = &mut self.value {
            w.handle = None;
        }
    }

    /// Values accepted by the validator, if it enumerates them.
    pub fn allowed_values(&self) -> Vec<String> {
        self.validator
            .as_ref()
            .map(|v| v.allowed_values())
            .unwrap_or_default()
    }

    /// Set a typed value, running the validator first.
    pub fn set(&mut self, value: impl Into<PropertyValue>) -> Result<()> {
        let value = self.coerce(value.into())?;
        let value = match (value, &self.value) {
            // A bare handle keeps the name already given to the property.
            (PropertyValue::Workspace(mut incoming), PropertyValue::Workspace(current))
                if incoming.name.is_empty() && incoming.handle.is_some() =>
            {
                incoming.name = current.name.clone();
                PropertyValue::Workspace(incoming)
            }
            (v, _) => v,
        };
        self.check(&value).map_err(|message| FrameworkError::Validation {
            property: self.name.clone(),
            message,
        })?;
        self.value = value;
        self.is_default = false;
        Ok(())
    }

    /// Set from a string, parsing according to the declared kind.
    pub fn set_from_str(&mut self, text: &str) -> Result<()> {
        let value = PropertyValue::parse(self.kind(), text).map_err(|e| {
            FrameworkError::Validation {
                property: self.name.clone(),
                message: e.to_string(),
            }
        })?;
        self.set(value)
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
        self.is_default = true;
    }

    /// Run the validator against the current value.
    pub fn is_valid(&self) -> std::result::Result<(), String> {
        if self.is_workspace() {
            if let Some(w) = self.workspace_value() {
                if w.name.is_empty() && w.handle.is_none() && !self.optional {
                    return Err(match self.direction {
                        Direction::Output => "Enter a name for the Output workspace".to_string(),
                        _ => format!("Enter a name for the {} workspace", self.direction),
                    });
                }
            }
        }
        self.check(&self.value)
    }

    pub fn value_as_string(&self) -> String {
        self.value.to_string()
    }

    pub fn to_history(&self) -> PropertyHistory {
        PropertyHistory {
            name: self.name.clone(),
            value: self.value_as_string(),
            is_default: self.is_default,
            direction: self.direction,
        }
    }

    fn check(&self, value: &PropertyValue) -> std::result::Result<(), String> {
        match &self.validator {
            Some(v) => v.check(value),
            None => Ok(()),
        }
    }

    fn coerce(&self, value: PropertyValue) -> Result<PropertyValue> {
        let kind = self.kind();
        if value.kind() == kind {
            return Ok(value);
        }
        let coerced = match (kind, value) {
            (PropertyKind::Double, PropertyValue::Int(i)) => PropertyValue::Double(i as f64),
            (PropertyKind::DoubleArray, PropertyValue::IntArray(v)) => {
                PropertyValue::DoubleArray(v.into_iter().map(|i| i as f64).collect())
            }
            (PropertyKind::Workspace, PropertyValue::Str(name)) => {
                PropertyValue::Workspace(WorkspaceValue::named(name))
            }
            (_, other) => {
                return Err(FrameworkError::Validation {
                    property: self.name.clone(),
                    message: format!("expected a {kind}, got a {}", other.kind()),
                })
            }
        };
        Ok(coerced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_list_expands_ranges() {
        assert_eq!(parse_int_list("0-3, 7").unwrap(), vec![0, 1, 2, 3, 7]);
        assert_eq!(parse_int_list("-2,4").unwrap(), vec![-2, 4]);
        assert!(parse_int_list("5-1").is_err());
    }

    #[test]
    fn parse_int_list_rejects_huge_ranges() {
        let err = parse_int_list("0-9223372036854775806").unwrap_err();
        assert!(matches!(err, FrameworkError::Parse { ref value, .. } if value == "0-9223372036854775806"));
        assert!(matches!(
            parse_int_list("-9223372036854775808-9223372036854775807"),
            Err(FrameworkError::Parse { .. })
        ));
        assert!(parse_int_list(&format!("0-{MAX_LIST_ENTRIES}")).is_err());
    }

    #[test]
    fn parse_respects_kind() {
        assert_eq!(
            PropertyValue::parse(PropertyKind::DoubleArray, "0, 2.5,10").unwrap(),
            PropertyValue::DoubleArray(vec![0.0, 2.5, 10.0])
        );
        assert_eq!(
            PropertyValue::parse(PropertyKind::Bool, "True").unwrap(),
            PropertyValue::Bool(true)
        );
        assert!(PropertyValue::parse(PropertyKind::Int, "1.5").is_err());
    }

    #[test]
    fn set_marks_non_default_and_coerces_ints() {
        let mut p = Property::new("XMin", 0.0, Direction::Input);
        assert!(p.is_default());
        p.set(3).unwrap();
        assert_eq!(p.value(), &PropertyValue::Double(3.0));
        assert!(!p.is_default());
        assert!(p.set("text").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let v = PropertyValue::DoubleArray(vec![1.0, -0.5, 3.0]);
        let back = PropertyValue::parse(PropertyKind::DoubleArray, &v.to_string()).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn empty_output_workspace_name_is_reported() {
        let p = Property::workspace("OutputWorkspace", "", Direction::Output);
        assert_eq!(
            p.is_valid().unwrap_err(),
            "Enter a name for the Output workspace"
        );
        let p = p.optional(true);
        assert!(p.is_valid().is_ok());
    }
}
