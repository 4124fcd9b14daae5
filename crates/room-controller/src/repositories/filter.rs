//! Filter and update expressions over top-level document fields.
//!
//! A `Filter` is a conjunction of conditions. A field missing from a document
//! compares as JSON `null`, so `Filter::new().eq("room", Value::Null)` also
//! matches documents without a `room` key.
//!
//! An `Update` is a set of top-level field assignments merged into the
//! matched documents.

use crate::errors::StoreError;
use serde_json::{Map, Value};

/// A single condition on one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq(field, _) | Condition::Ne(field, _) | Condition::In(field, _) => field,
        }
    }

    fn matches(&self, document: &Value) -> bool {
        let actual = document.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Condition::Eq(_, expected) => actual == expected,
            Condition::Ne(_, expected) => actual != expected,
            Condition::In(_, candidates) => candidates.contains(actual),
        }
    }
}

/// Conjunction of field conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on the document `id`.
    pub fn by_id(id: &str) -> Self {
        Self::new().eq("id", id)
    }

    /// Equality filter from a field map (all pairs must match).
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            conditions: fields
                .into_iter()
                .map(|(field, value)| Condition::Eq(field.into(), value))
                .collect(),
        }
    }

    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Ne(field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a JSON document.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(document))
    }

    /// Reject field names that are not plain identifiers.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.conditions
            .iter()
            .try_for_each(|c| validate_identifier(c.field()))
    }
}

/// Set of top-level field assignments (`$set` semantics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    sets: Map<String, Value>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.sets.insert(field.to_string(), value.into());
        self
    }

    /// The assignments as a JSON object, suitable for a merge.
    pub fn to_value(&self) -> Value {
        Value::Object(self.sets.clone())
    }

    /// Merge the assignments into `document`.
    pub fn apply_to(&self, document: &mut Value) {
        if let Value::Object(map) = document {
            for (field, value) in &self.sets {
                map.insert(field.clone(), value.clone());
            }
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.sets.keys().try_for_each(|f| validate_identifier(f))?;
        if self.sets.contains_key("id") {
            return Err(StoreError::InvalidField(
                "id cannot be updated".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accept ASCII letters, digits and underscores, not starting with a digit.
pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(name.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&json!({ "id": "r1" })));
        assert!(Filter::new().is_empty());
    }

    #[test]
    fn test_eq_and_ne() {
        let doc = json!({ "id": "r1", "status": "single", "creator": "u1" });

        assert!(Filter::new().eq("status", "single").matches(&doc));
        assert!(!Filter::new().eq("status", "pk").matches(&doc));
        assert!(Filter::new()
            .eq("status", "single")
            .ne("creator", "u3")
            .matches(&doc));
        assert!(!Filter::new().ne("creator", "u1").matches(&doc));
    }

    #[test]
    fn test_missing_field_compares_as_null() {
        let doc = json!({ "id": "u1", "status": "idle" });

        assert!(Filter::new().eq("room", Value::Null).matches(&doc));
        assert!(Filter::new().ne("room", "r1").matches(&doc));
    }

    #[test]
    fn test_in_condition() {
        let filter = Filter::new()
            .eq("room", "r1")
            .is_in("status", ["watching", "joined", "joinWait"]);

        assert!(filter.matches(&json!({ "room": "r1", "status": "joined" })));
        assert!(!filter.matches(&json!({ "room": "r1", "status": "idle" })));
        assert!(!filter.matches(&json!({ "room": "r2", "status": "watching" })));
    }

    #[test]
    fn test_from_fields() {
        let filter = Filter::from_fields([("name", json!("alice-room"))]);
        assert_eq!(
            filter.conditions(),
            &[Condition::Eq("name".to_string(), json!("alice-room"))]
        );
    }

    #[test]
    fn test_update_apply_overwrites_and_nulls() {
        let mut doc = json!({ "id": "u1", "status": "joined", "room": "r1", "joinPosition": 2 });

        Update::new()
            .set("status", "idle")
            .set("room", Value::Null)
            .set("joinPosition", Value::Null)
            .apply_to(&mut doc);

        assert_eq!(
            doc,
            json!({ "id": "u1", "status": "idle", "room": null, "joinPosition": null })
        );
    }

    #[test]
    fn test_validate_identifiers() {
        assert!(validate_identifier("joinPosition").is_ok());
        assert!(validate_identifier("active_users").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("name'; DROP").is_err());

        assert!(Filter::new().eq("bad field", 1).validate().is_err());
        assert!(Update::new().set("id", "x").validate().is_err());
        assert!(Update::new().set("status", "idle").validate().is_ok());
    }
}
