//! Declarative seed data: custom fields plus one work package using them,
//! and optionally further work packages for it to reference

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{
    CustomFieldDefinition, CustomFieldId, CustomOption, CustomOptionId, FieldFormat, FieldValue,
    WorkPackageId,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureSpec {
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldSpec>,
    #[serde(default)]
    pub work_package: WorkPackageSpec,
    /// Subjects of additional work packages
    #[serde(default)]
    pub related_work_packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldSpec {
    pub name: String,
    pub format: FieldFormat,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    /// Option labels, list fields only
    #[serde(default)]
    pub possible_values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPackageSpec {
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Initial values by field name; list values by option label
    #[serde(default)]
    pub custom_values: BTreeMap<String, FixtureValue>,
}

impl Default for WorkPackageSpec {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            custom_values: BTreeMap::new(),
        }
    }
}

fn default_subject() -> String {
    "Inplace editing".to_string()
}

/// A value as written in a fixture file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// What applying a fixture produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeededFixture {
    pub work_package_id: WorkPackageId,
    pub fields: BTreeMap<String, CustomFieldDefinition>,
    /// Additional work packages by subject
    #[serde(default)]
    pub related: BTreeMap<String, WorkPackageId>,
}

impl SeededFixture {
    pub fn field(&self, name: &str) -> Result<&CustomFieldDefinition> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::not_found("custom_field", name))
    }
}

impl FixtureSpec {
    /// Insert the fields and the work package, then set its initial values
    pub fn apply(&self, db: &Database) -> Result<SeededFixture> {
        let mut fields = BTreeMap::new();
        for spec in &self.custom_fields {
            if fields.contains_key(&spec.name) {
                return Err(Error::InvalidFixture(format!("duplicate custom field '{}'", spec.name)));
            }
            let stored = db.insert_custom_field(&spec.definition())?;
            fields.insert(spec.name.clone(), stored);
        }

        let work_package_id = db.create_work_package(&self.work_package.subject)?;
        for (name, raw) in &self.work_package.custom_values {
            let def = fields
                .get(name)
                .ok_or_else(|| Error::InvalidFixture(format!("value for unknown custom field '{}'", name)))?;
            let value = raw.to_field_value(def)?;
            db.set_custom_value(work_package_id, def.id, &value)?;
        }

        let mut related = BTreeMap::new();
        for subject in &self.related_work_packages {
            if related.contains_key(subject) {
                return Err(Error::InvalidFixture(format!("duplicate work package '{}'", subject)));
            }
            related.insert(subject.clone(), db.create_work_package(subject)?);
        }

        info!(
            work_package = %work_package_id,
            fields = fields.len(),
            related = related.len(),
            "fixture applied"
        );
        Ok(SeededFixture {
            work_package_id,
            fields,
            related,
        })
    }
}

impl CustomFieldSpec {
    fn definition(&self) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: CustomFieldId(0),
            name: self.name.clone(),
            format: self.format,
            is_required: self.is_required,
            min_length: self.min_length,
            max_length: self.max_length,
            possible_values: self
                .possible_values
                .iter()
                .map(|value| CustomOption {
                    id: CustomOptionId(0),
                    custom_field_id: CustomFieldId(0),
                    value: value.clone(),
                    position: 0,
                })
                .collect(),
        }
    }
}

impl FixtureValue {
    /// Resolve against `def`; list values name an option label
    pub fn to_field_value(&self, def: &CustomFieldDefinition) -> Result<FieldValue> {
        let invalid = |reason: String| Error::InvalidFixture(format!("{}: {}", def.name, reason));
        match (def.format, self) {
            (FieldFormat::Int, FixtureValue::Integer(i)) => Ok(FieldValue::Integer(*i)),
            (FieldFormat::Float, FixtureValue::Integer(i)) => Ok(FieldValue::Float(*i as f64)),
            (FieldFormat::Float, FixtureValue::Float(f)) => Ok(FieldValue::Float(*f)),
            (FieldFormat::List, FixtureValue::Text(label)) => def
                .option_by_value(label)
                .map(|o| FieldValue::Option(o.id))
                .ok_or_else(|| invalid(format!("no option labelled '{}'", label))),
            (format, FixtureValue::Text(s)) => {
                FieldValue::from_canonical(format, s).map_err(|e| invalid(e.to_string()))
            }
            (format, other) => Err(invalid(format!("{:?} does not fit a {} field", other, format))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE_JSON: &str = r#"{
        "custom_fields": [
            {"name": "MyFloat", "format": "float"},
            {"name": "Letters", "format": "list", "possible_values": ["foo", "bar"]}
        ],
        "work_package": {"custom_values": {"MyFloat": 123.5, "Letters": "bar"}}
    }"#;

    #[test]
    fn test_apply_fixture() {
        let db = Database::open_memory().unwrap();
        let spec: FixtureSpec = serde_json::from_str(FIXTURE_JSON).unwrap();
        let seeded = spec.apply(&db).unwrap();

        let float = seeded.field("MyFloat").unwrap();
        let letters = seeded.field("Letters").unwrap();
        let wp = db.get_work_package(seeded.work_package_id).unwrap().unwrap();
        assert_eq!(wp.subject, "Inplace editing");
        assert_eq!(wp.custom_value(float.id), &FieldValue::Float(123.5));
        assert_eq!(
            wp.custom_value(letters.id),
            &FieldValue::Option(letters.option_by_value("bar").unwrap().id)
        );
        assert!(seeded.field("Missing").is_err());
        assert!(seeded.related.is_empty());
    }

    #[test]
    fn test_apply_related_work_packages() {
        let db = Database::open_memory().unwrap();
        let spec: FixtureSpec =
            serde_json::from_str(r#"{"related_work_packages": ["Dependency", "Follow-up"]}"#).unwrap();
        let seeded = spec.apply(&db).unwrap();

        let dependency = seeded.related["Dependency"];
        assert_ne!(dependency, seeded.work_package_id);
        assert_eq!(
            db.work_package_subject(dependency).unwrap().as_deref(),
            Some("Dependency")
        );
        assert_eq!(db.search_work_packages("follow", 10).unwrap().len(), 1);

        let spec: FixtureSpec =
            serde_json::from_str(r#"{"related_work_packages": ["Twice", "Twice"]}"#).unwrap();
        assert!(matches!(spec.apply(&db), Err(Error::InvalidFixture(_))));
    }

    #[test]
    fn test_rejects_unknown_field_value() {
        let db = Database::open_memory().unwrap();
        let mut spec = FixtureSpec::default();
        spec.work_package
            .custom_values
            .insert("Nope".to_string(), FixtureValue::Integer(1));
        assert!(matches!(spec.apply(&db), Err(Error::InvalidFixture(_))));
    }

    #[test]
    fn test_rejects_mismatched_value() {
        let db = Database::open_memory().unwrap();
        let spec: FixtureSpec = serde_json::from_str(
            r#"{"custom_fields": [{"name": "N", "format": "int"}],
                "work_package": {"custom_values": {"N": 1.5}}}"#,
        )
        .unwrap();
        assert!(matches!(spec.apply(&db), Err(Error::InvalidFixture(_))));
    }
}
