//! Core types for Inplace

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const ATTRIBUTE_PREFIX: &str = "customField";
const CUSTOM_OPTION_PATH: &str = "/api/v3/custom_options/";

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

id_newtype!(
    /// Identifier of a custom field definition
    CustomFieldId
);
id_newtype!(
    /// Identifier of one possible value of a list custom field
    CustomOptionId
);
id_newtype!(
    /// Identifier of a work package
    WorkPackageId
);

impl CustomOptionId {
    /// Resource path under which the option is exposed
    pub fn href(&self) -> String {
        format!("{}{}", CUSTOM_OPTION_PATH, self.0)
    }

    /// Parse `/api/v3/custom_options/<id>`
    pub fn from_href(href: &str) -> Option<Self> {
        href.strip_prefix(CUSTOM_OPTION_PATH)?
            .parse::<u64>()
            .ok()
            .map(Self)
    }
}

/// Attribute key of a custom field on a work package (`customField<id>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeKey(CustomFieldId);

impl AttributeKey {
    pub fn new(id: CustomFieldId) -> Self {
        Self(id)
    }

    pub fn custom_field_id(&self) -> CustomFieldId {
        self.0
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ATTRIBUTE_PREFIX, self.0)
    }
}

impl FromStr for AttributeKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix(ATTRIBUTE_PREFIX)
            .ok_or_else(|| Error::InvalidAttribute(s.to_string()))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidAttribute(s.to_string()));
        }
        digits
            .parse::<u64>()
            .map(|id| Self(CustomFieldId(id)))
            .map_err(|_| Error::InvalidAttribute(s.to_string()))
    }
}

impl Serialize for AttributeKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AttributeKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared value type of a custom field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    #[serde(rename = "string")]
    Text,
    #[serde(rename = "text")]
    LongText,
    List,
    Int,
    Float,
}

impl FieldFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldFormat::Text => "string",
            FieldFormat::LongText => "text",
            FieldFormat::List => "list",
            FieldFormat::Int => "int",
            FieldFormat::Float => "float",
        }
    }

    /// Input control rendered while the field is being edited
    pub fn editor_kind(&self) -> EditorKind {
        match self {
            FieldFormat::Text | FieldFormat::Int | FieldFormat::Float => EditorKind::Input,
            FieldFormat::LongText => EditorKind::Textarea,
            FieldFormat::List => EditorKind::Select,
        }
    }
}

impl fmt::Display for FieldFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(FieldFormat::Text),
            "text" => Ok(FieldFormat::LongText),
            "list" => Ok(FieldFormat::List),
            "int" => Ok(FieldFormat::Int),
            "float" => Ok(FieldFormat::Float),
            other => Err(Error::InvalidValue {
                field: "field_format".to_string(),
                reason: format!("unknown format '{}'", other),
            }),
        }
    }
}

/// Kind of input control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    /// Single-line input
    Input,
    /// Multi-line editor
    Textarea,
    /// Option picker
    Select,
}

impl EditorKind {
    /// Enter commits single-line inputs only
    pub fn submits_on_enter(&self) -> bool {
        matches!(self, EditorKind::Input)
    }

    /// Escape is a content keystroke in multi-line editors
    pub fn cancels_on_escape(&self) -> bool {
        !matches!(self, EditorKind::Textarea)
    }

    /// Formatted text editors can render a preview of their content
    pub fn supports_preview(&self) -> bool {
        matches!(self, EditorKind::Textarea)
    }

    /// Formatted text editors complete `#` work package references
    pub fn completes_references(&self) -> bool {
        matches!(self, EditorKind::Textarea)
    }
}

/// One possible value of a list custom field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOption {
    pub id: CustomOptionId,
    pub custom_field_id: CustomFieldId,
    pub value: String,
    pub position: u32,
}

impl CustomOption {
    pub fn href(&self) -> String {
        self.id.href()
    }
}

/// A user-defined attribute on work packages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: CustomFieldId,
    pub name: String,
    pub format: FieldFormat,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub possible_values: Vec<CustomOption>,
}

impl CustomFieldDefinition {
    pub fn attribute_key(&self) -> AttributeKey {
        AttributeKey::new(self.id)
    }

    pub fn option_by_id(&self, id: CustomOptionId) -> Option<&CustomOption> {
        self.possible_values.iter().find(|o| o.id == id)
    }

    pub fn option_by_value(&self, value: &str) -> Option<&CustomOption> {
        self.possible_values.iter().find(|o| o.value == value)
    }

    pub fn option_by_href(&self, href: &str) -> Option<&CustomOption> {
        CustomOptionId::from_href(href).and_then(|id| self.option_by_id(id))
    }
}

/// Canonical, locale independent value of a custom field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Unset,
    Text(String),
    Integer(i64),
    Float(f64),
    Option(CustomOptionId),
}

impl FieldValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, FieldValue::Unset)
    }

    /// Text form as persisted in the custom value store
    pub fn canonical_string(&self) -> String {
        match self {
            FieldValue::Unset => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Option(id) => id.to_string(),
        }
    }

    /// Parse the persisted text form for a given format
    pub fn from_canonical(format: FieldFormat, raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(FieldValue::Unset);
        }
        let invalid = |reason: &str| Error::InvalidValue {
            field: format.to_string(),
            reason: format!("{} ('{}')", reason, raw),
        };
        match format {
            FieldFormat::Text | FieldFormat::LongText => Ok(FieldValue::Text(raw.to_string())),
            FieldFormat::Int => raw
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| invalid("not an integer")),
            FieldFormat::Float => match raw.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(FieldValue::Float(f)),
                _ => Err(invalid("not a number")),
            },
            FieldFormat::List => raw
                .parse::<u64>()
                .map(|id| FieldValue::Option(CustomOptionId(id)))
                .map_err(|_| invalid("not an option id")),
        }
    }

    /// Whether this value may be stored in a field of `format`
    pub fn matches_format(&self, format: FieldFormat) -> bool {
        match self {
            FieldValue::Unset => true,
            FieldValue::Text(_) => matches!(format, FieldFormat::Text | FieldFormat::LongText),
            FieldValue::Integer(_) => format == FieldFormat::Int,
            FieldValue::Float(f) => format == FieldFormat::Float && f.is_finite(),
            FieldValue::Option(_) => format == FieldFormat::List,
        }
    }
}

/// A work package with its custom values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPackage {
    pub id: WorkPackageId,
    pub subject: String,
    pub lock_version: i64,
    #[serde(default)]
    pub custom_values: BTreeMap<CustomFieldId, FieldValue>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Id and subject of a work package, as offered for references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPackageSummary {
    pub id: WorkPackageId,
    pub subject: String,
}

impl WorkPackage {
    pub fn summary(&self) -> WorkPackageSummary {
        WorkPackageSummary {
            id: self.id,
            subject: self.subject.clone(),
        }
    }

    pub fn custom_value(&self, id: CustomFieldId) -> &FieldValue {
        static UNSET: FieldValue = FieldValue::Unset;
        self.custom_values.get(&id).unwrap_or(&UNSET)
    }
}
