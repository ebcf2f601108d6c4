use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::history::PropertyHistory;
use crate::error::{FrameworkError, Result};
use crate::kernel::property::{Direction, FromPropertyValue, Property, PropertyValue};
use crate::kernel::validators::{CrossValidator, Validator};

// ---------------------------------------------------------------------------
// PropertyManager – ordered, named, validated property store
// ---------------------------------------------------------------------------

/// Typed storage and validation of named properties.
///
/// Lookup is case-insensitive; declaration order is preserved and is the
/// order used for history snapshots.
#[derive(Debug, Default, Clone)]
pub struct PropertyManager {
    properties: Vec<Property>,
    cross_checks: Vec<Arc<dyn CrossValidator>>,
}

impl PropertyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully built property.
    pub fn declare(&mut self, property: Property) -> Result<()> {
        if self.position(property.name()).is_some() {
            return Err(FrameworkError::DuplicateProperty(property.name().to_string()));
        }
        self.properties.push(property);
        Ok(())
    }

    /// Register a property from a default value, optional validator and direction.
    pub fn declare_property(
        &mut self,
        name: &str,
        default: impl Into<PropertyValue>,
        validator: Option<Arc<dyn Validator>>,
        direction: Direction,
    ) -> Result<()> {
        let mut property = Property::new(name, default, direction);
        if let Some(v) = validator {
            property = property.with_validator(v);
        }
        self.declare(property)
    }

    /// Register a workspace property.
    pub fn declare_workspace(
        &mut self,
        name: &str,
        direction: Direction,
        optional: bool,
        validator: Option<Arc<dyn Validator>>,
    ) -> Result<()> {
        let mut property = Property::workspace(name, "", direction).optional(optional);
        if let Some(v) = validator {
            property = property.with_validator(v);
        }
        self.declare(property)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn property(&self, name: &str) -> Result<&Property> {
        self.position(name)
            .map(|i| &self.properties[i])
            .ok_or_else(|| FrameworkError::UnknownProperty(name.to_string()))
    }

    pub fn property_mut(&mut self, name: &str) -> Result<&mut Property> {
        match self.position(name) {
            Some(i) => Ok(&mut self.properties[i]),
            None => Err(FrameworkError::UnknownProperty(name.to_string())),
        }
    }

    /// All properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut [Property] {
        &mut self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Set a typed value; the validator runs immediately.
    pub fn set_property(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        self.property_mut(name)?.set(value)
    }

    /// Set from a string, parsed according to the declared kind.
    pub fn set_property_value(&mut self, name: &str, text: &str) -> Result<()> {
        self.property_mut(name)?.set_from_str(text)
    }

    /// Set several properties from `"Name=Value;Name=Value"`.
    ///
    /// Stops at the first failure; earlier assignments stay applied.
    pub fn set_properties(&mut self, assignments: &str) -> Result<()> {
        for item in assignments.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, value) = item.split_once('=').ok_or_else(|| FrameworkError::Parse {
                value: item.to_string(),
                expected: "Name=Value".to_string(),
            })?;
            self.set_property_value(name.trim(), value.trim())?;
        }
        Ok(())
    }

    /// Typed read; the declared default when never set.
    pub fn get_property<T: FromPropertyValue>(&self, name: &str) -> Result<T> {
        let property = self.property(name)?;
        T::from_property(property.value()).ok_or_else(|| FrameworkError::Validation {
            property: property.name().to_string(),
            message: format!(
                "value '{}' cannot be read as {}",
                property.value_as_string(),
                std::any::type_name::<T>()
            ),
        })
    }

    /// String form of a property value.
    pub fn get_property_value(&self, name: &str) -> Result<String> {
        Ok(self.property(name)?.value_as_string())
    }

    /// Register a check spanning several properties, run by [`Self::validate_all`].
    pub fn add_cross_check(&mut self, check: Arc<dyn CrossValidator>) {
        self.cross_checks.push(check);
    }

    /// Run every property validator, then every cross-property check.
    ///
    /// Maps property name to message; the first message for a name wins.
    pub fn validate_all(&self) -> BTreeMap<String, String> {
        let mut violations: BTreeMap<String, String> = self
            .properties
            .iter()
            .filter_map(|p| p.is_valid().err().map(|msg| (p.name().to_string(), msg)))
            .collect();
        for check in &self.cross_checks {
            for (name, msg) in check.check(self) {
                violations.entry(name).or_insert(msg);
            }
        }
        violations
    }

    pub fn reset_properties(&mut self) {
        self.properties.iter_mut().for_each(Property::reset);
    }

    /// Snapshot of every property for provenance.
    pub fn to_history(&self) -> Vec<PropertyHistory> {
        self.properties.iter().map(Property::to_history).collect()
    }

    /// `Name=Value` pairs of non-default properties, `;` separated.
    pub fn as_string(&self) -> String {
        self.properties
            .iter()
            .filter(|p| !p.is_default())
            .map(|p| format!("{}={}", p.name(), p.value_as_string()))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.name().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::validators::{BoundedValidator, MandatoryValidator, OrderedPair};

    fn manager() -> PropertyManager {
        let mut pm = PropertyManager::new();
        pm.declare_property(
            "NBunch",
            1,
            Some(Arc::new(BoundedValidator::new().lower(1.0))),
            Direction::Input,
        )
        .unwrap();
        pm.declare_property("Label", "", Some(Arc::new(MandatoryValidator)), Direction::Input)
            .unwrap();
        pm.declare_property("Result", 0.0, None, Direction::Output).unwrap();
        pm
    }

    #[test]
    fn duplicate_declaration_fails() {
        let mut pm = manager();
        let err = pm
            .declare_property("nbunch", 2, None, Direction::Input)
            .unwrap_err();
        assert!(matches!(err, FrameworkError::DuplicateProperty(_)));
    }

    #[test]
    fn unknown_property_fails() {
        let mut pm = manager();
        assert!(matches!(
            pm.set_property_value("Nope", "1"),
            Err(FrameworkError::UnknownProperty(_))
        ));
        assert!(matches!(
            pm.get_property::<i64>("Nope"),
            Err(FrameworkError::UnknownProperty(_))
        ));
    }

    #[test]
    fn out_of_range_value_is_rejected_and_not_stored() {
        let mut pm = manager();
        let err = pm.set_property_value("NBunch", "0").unwrap_err();
        assert!(err.to_string().contains("lower bound (1)"), "{err}");
        assert_eq!(pm.get_property::<i64>("NBunch").unwrap(), 1);
        assert!(pm.property("NBunch").unwrap().is_default());
    }

    #[test]
    fn default_returned_until_set() {
        let mut pm = manager();
        assert_eq!(pm.get_property::<i64>("nbunch").unwrap(), 1);
        pm.set_property("NBunch", 5).unwrap();
        assert_eq!(pm.get_property::<i64>("NBunch").unwrap(), 5);
        assert!(!pm.property("NBunch").unwrap().is_default());
    }

    #[test]
    fn validate_all_reports_unset_mandatory() {
        let mut pm = manager();
        let violations = pm.validate_all();
        assert_eq!(violations.len(), 1);
        assert!(violations.contains_key("Label"));
        pm.set_property("Label", "run 42").unwrap();
        assert!(pm.validate_all().is_empty());
    }

    #[test]
    fn set_properties_parses_assignments() {
        let mut pm = manager();
        pm.set_properties("NBunch=3; Label=abc").unwrap();
        assert_eq!(pm.get_property::<i64>("NBunch").unwrap(), 3);
        assert_eq!(pm.as_string(), "NBunch=3;Label=abc");
        assert!(pm.set_properties("NBunch").is_err());
    }

    #[test]
    fn history_snapshot_keeps_declaration_order() {
        let mut pm = manager();
        pm.set_property("Label", "x").unwrap();
        let snapshot = pm.to_history();
        let names: Vec<_> = snapshot.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["NBunch", "Label", "Result"]);
        assert!(snapshot[0].is_default);
        assert!(!snapshot[1].is_default);
        assert_eq!(snapshot[2].direction, Direction::Output);
    }

    #[test]
    fn validate_all_reports_combinations_alongside_single_values() {
        let mut pm = manager();
        pm.declare_property("XMin", f64::NAN, None, Direction::Input).unwrap();
        pm.declare_property("XMax", f64::NAN, None, Direction::Input).unwrap();
        pm.add_cross_check(Arc::new(OrderedPair::new("XMin", "XMax")));
        assert_eq!(pm.validate_all().len(), 1);

        pm.set_properties("XMin=5;XMax=1").unwrap();
        let violations = pm.validate_all();
        assert!(violations.contains_key("Label"));
        assert_eq!(violations["XMax"], "XMax must be greater than XMin");

        pm.set_property("XMax", 7.5).unwrap();
        assert!(!pm.validate_all().contains_key("XMax"));
    }
}
