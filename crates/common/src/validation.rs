//! Value validation for custom fields
//!
//! Two entry points: [`parse_input`] is the client-side pre-check that turns
//! typed text into a canonical [`FieldValue`], and [`validate_value`] is the
//! contract every update collaborator enforces before persisting.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::i18n::{self, MessageKey};
use crate::locale::{self, Locale, NumberParseError};
use crate::types::{AttributeKey, CustomFieldDefinition, FieldFormat, FieldValue};

/// Category of a refused value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Required,
    TooLong,
    TooShort,
    Malformed,
    /// Any other refusal: unknown record, server failure, transport failure
    Rejected,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationErrorKind::Required => "required",
            ValidationErrorKind::TooLong => "too_long",
            ValidationErrorKind::TooShort => "too_short",
            ValidationErrorKind::Malformed => "malformed",
            ValidationErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A user-visible validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    #[serde(default)]
    pub attribute: Option<AttributeKey>,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, attribute: Option<AttributeKey>, message: impl Into<String>) -> Self {
        Self {
            kind,
            attribute,
            message: message.into(),
        }
    }

    pub fn required(def: &CustomFieldDefinition, locale: &Locale) -> Self {
        Self::for_field(ValidationErrorKind::Required, def, MessageKey::Blank, None, locale)
    }

    pub fn too_long(def: &CustomFieldDefinition, max: u32, locale: &Locale) -> Self {
        Self::for_field(ValidationErrorKind::TooLong, def, MessageKey::TooLong, Some(max), locale)
    }

    pub fn too_short(def: &CustomFieldDefinition, min: u32, locale: &Locale) -> Self {
        Self::for_field(ValidationErrorKind::TooShort, def, MessageKey::TooShort, Some(min), locale)
    }

    pub fn malformed(def: &CustomFieldDefinition, key: MessageKey, locale: &Locale) -> Self {
        Self::for_field(ValidationErrorKind::Malformed, def, key, None, locale)
    }

    pub fn rejected(attribute: Option<AttributeKey>, message: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::Rejected, attribute, message)
    }

    fn for_field(
        kind: ValidationErrorKind,
        def: &CustomFieldDefinition,
        key: MessageKey,
        count: Option<u32>,
        locale: &Locale,
    ) -> Self {
        Self {
            kind,
            attribute: Some(def.attribute_key()),
            message: i18n::message(key, locale, &def.name, count),
        }
    }
}

/// Turn editor text into a canonical value, or refuse it locally
pub fn parse_input(
    def: &CustomFieldDefinition,
    input: &str,
    locale: &Locale,
) -> Result<FieldValue, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return if def.is_required {
            Err(ValidationError::required(def, locale))
        } else {
            Ok(FieldValue::Unset)
        };
    }

    match def.format {
        // Text keeps its surrounding whitespace; only emptiness is judged on the trimmed form.
        FieldFormat::Text | FieldFormat::LongText => Ok(FieldValue::Text(input.to_string())),
        FieldFormat::Int => locale::parse_integer(trimmed)
            .map(FieldValue::Integer)
            .map_err(|e| number_error(def, e, locale)),
        FieldFormat::Float => locale::parse_float(trimmed, locale)
            .map(FieldValue::Float)
            .map_err(|e| number_error(def, e, locale)),
        FieldFormat::List => def
            .option_by_value(trimmed)
            .or_else(|| def.option_by_href(trimmed))
            .map(|o| FieldValue::Option(o.id))
            .ok_or_else(|| ValidationError::malformed(def, MessageKey::Inclusion, locale)),
    }
}

fn number_error(def: &CustomFieldDefinition, e: NumberParseError, locale: &Locale) -> ValidationError {
    match e {
        NumberParseError::Empty => ValidationError::required(def, locale),
        NumberParseError::NotANumber => ValidationError::malformed(def, MessageKey::NotANumber, locale),
        NumberParseError::NotAnInteger => ValidationError::malformed(def, MessageKey::NotAnInteger, locale),
    }
}

/// Check a canonical value against the field's constraints
pub fn validate_value(
    def: &CustomFieldDefinition,
    value: &FieldValue,
    locale: &Locale,
) -> Result<(), ValidationError> {
    if value.is_unset() {
        return if def.is_required {
            Err(ValidationError::required(def, locale))
        } else {
            Ok(())
        };
    }

    if !value.matches_format(def.format) {
        let key = match def.format {
            FieldFormat::Int => MessageKey::NotAnInteger,
            FieldFormat::Float => MessageKey::NotANumber,
            _ => MessageKey::Inclusion,
        };
        return Err(ValidationError::malformed(def, key, locale));
    }

    if let FieldValue::Option(id) = value {
        if def.option_by_id(*id).is_none() {
            return Err(ValidationError::malformed(def, MessageKey::Inclusion, locale));
        }
        return Ok(());
    }

    if let FieldValue::Text(text) = value {
        if def.is_required && text.trim().is_empty() {
            return Err(ValidationError::required(def, locale));
        }
    }

    let length = value.canonical_string().chars().count();
    if let Some(max) = def.max_length.filter(|m| *m > 0) {
        if length > max as usize {
            return Err(ValidationError::too_long(def, max, locale));
        }
    }
    if let Some(min) = def.min_length.filter(|m| *m > 0) {
        if length < min as usize {
            return Err(ValidationError::too_short(def, min, locale));
        }
    }
    Ok(())
}
