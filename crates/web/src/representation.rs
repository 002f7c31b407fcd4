//! JSON representation of work packages, custom fields and custom options
//!
//! Scalar custom values appear as top-level `customField<id>` properties;
//! list values are links under `_links.customField<id>` pointing at
//! `/api/v3/custom_options/<id>`.

use chrono::{DateTime, TimeZone, Utc};
use inplace_common::i18n::MessageKey;
use inplace_common::locale;
use inplace_common::{
    AttributeKey, CustomFieldDefinition, CustomOption, CustomOptionId, FieldFormat, FieldValue, Locale,
    ValidationError, WorkPackage, WorkPackageId, WorkPackageSummary,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::{WebError, WebResult};

const LONG_TEXT_FORMAT: &str = "markdown";

pub fn work_package_href(id: WorkPackageId) -> String {
    format!("/api/v3/work_packages/{}", id)
}

pub fn custom_field_href(def: &CustomFieldDefinition) -> String {
    format!("/api/v3/custom_fields/{}", def.id)
}

fn timestamp(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_default()
        .to_rfc3339()
}

/// Render a work package with every custom field in `fields`
pub fn render_work_package(wp: &WorkPackage, fields: &[CustomFieldDefinition]) -> Value {
    let mut body = Map::new();
    let mut links = Map::new();
    links.insert("self".to_string(), json!({ "href": work_package_href(wp.id) }));

    body.insert("_type".to_string(), json!("WorkPackage"));
    body.insert("id".to_string(), json!(wp.id.0));
    body.insert("subject".to_string(), json!(wp.subject));
    body.insert("lockVersion".to_string(), json!(wp.lock_version));
    body.insert("createdAt".to_string(), json!(timestamp(wp.created_at)));
    body.insert("updatedAt".to_string(), json!(timestamp(wp.updated_at)));

    for def in fields {
        let key = def.attribute_key().to_string();
        let value = wp.custom_value(def.id);
        match def.format {
            FieldFormat::List => {
                let link = match value {
                    FieldValue::Option(id) => json!({
                        "href": id.href(),
                        "title": def.option_by_id(*id).map(|o| o.value.clone()),
                    }),
                    _ => json!({ "href": Value::Null }),
                };
                links.insert(key, link);
            }
            _ => {
                body.insert(key, scalar_json(def.format, value));
            }
        }
    }

    body.insert("_links".to_string(), Value::Object(links));
    Value::Object(body)
}

fn scalar_json(format: FieldFormat, value: &FieldValue) -> Value {
    match value {
        FieldValue::Unset => Value::Null,
        FieldValue::Text(s) if format == FieldFormat::LongText => json!({
            "format": LONG_TEXT_FORMAT,
            "raw": s,
        }),
        FieldValue::Text(s) => json!(s),
        FieldValue::Integer(i) => json!(i),
        FieldValue::Float(f) => json!(f),
        FieldValue::Option(id) => json!(id.href()),
    }
}

pub fn render_custom_field(def: &CustomFieldDefinition) -> Value {
    json!({
        "_type": "CustomField",
        "id": def.id.0,
        "name": def.name,
        "fieldFormat": def.format.as_str(),
        "attribute": def.attribute_key().to_string(),
        "isRequired": def.is_required,
        "minLength": def.min_length,
        "maxLength": def.max_length,
        "possibleValues": def.possible_values.iter().map(render_custom_option).collect::<Vec<_>>(),
        "_links": { "self": { "href": custom_field_href(def) } },
    })
}

pub fn render_custom_option(option: &CustomOption) -> Value {
    json!({
        "_type": "CustomOption",
        "id": option.id.0,
        "value": option.value,
        "position": option.position,
        "_links": { "self": { "href": option.href() } },
    })
}

/// Parse a custom field representation back into a definition
pub fn parse_custom_field(value: &Value) -> WebResult<CustomFieldDefinition> {
    let obj = as_object(value)?;
    let id = obj
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| WebError::Representation("custom field without id".to_string()))?;
    let format: FieldFormat = obj
        .get("fieldFormat")
        .and_then(Value::as_str)
        .ok_or_else(|| WebError::Representation("custom field without fieldFormat".to_string()))?
        .parse()?;

    let mut possible_values = Vec::new();
    if let Some(Value::Array(items)) = obj.get("possibleValues") {
        for item in items {
            let option = as_object(item)?;
            possible_values.push(CustomOption {
                id: CustomOptionId(option.get("id").and_then(Value::as_u64).unwrap_or_default()),
                custom_field_id: id.into(),
                value: option
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                position: option.get("position").and_then(Value::as_u64).unwrap_or_default() as u32,
            });
        }
    }

    let length = |key: &str| obj.get(key).and_then(Value::as_u64).map(|n| n as u32);
    Ok(CustomFieldDefinition {
        id: id.into(),
        name: obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        format,
        is_required: obj.get("isRequired").and_then(Value::as_bool).unwrap_or(false),
        min_length: length("minLength"),
        max_length: length("maxLength"),
        possible_values,
    })
}

/// Parse a work package representation, decoding the custom values of `fields`
pub fn parse_work_package(value: &Value, fields: &[CustomFieldDefinition]) -> WebResult<WorkPackage> {
    let obj = as_object(value)?;
    let id = obj
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| WebError::Representation("work package without id".to_string()))?;
    let time = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.timestamp())
            .unwrap_or_default()
    };

    let links = obj.get("_links").and_then(Value::as_object);
    let mut custom_values = BTreeMap::new();
    for def in fields {
        let key = def.attribute_key().to_string();
        let decoded = match def.format {
            FieldFormat::List => links
                .and_then(|l| l.get(&key))
                .map(|link| decode_link(link))
                .transpose(),
            format => obj.get(&key).map(|v| decode_canonical(format, v)).transpose(),
        };
        let value = decoded
            .map_err(|reason| WebError::Representation(format!("{}: {}", key, reason)))?
            .unwrap_or_default();
        if !value.is_unset() {
            custom_values.insert(def.id, value);
        }
    }

    Ok(WorkPackage {
        id: id.into(),
        subject: obj
            .get("subject")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        lock_version: obj.get("lockVersion").and_then(Value::as_i64).unwrap_or_default(),
        custom_values,
        created_at: time("createdAt"),
        updated_at: time("updatedAt"),
    })
}

/// Collection of work package summaries offered for `#` references
pub fn render_summaries(summaries: &[WorkPackageSummary]) -> Value {
    let elements: Vec<Value> = summaries
        .iter()
        .map(|wp| {
            json!({
                "_type": "WorkPackage",
                "id": wp.id.0,
                "subject": wp.subject,
                "_links": { "self": { "href": work_package_href(wp.id) } },
            })
        })
        .collect();
    json!({
        "_type": "Collection",
        "total": elements.len(),
        "count": elements.len(),
        "_embedded": { "elements": elements },
    })
}

pub fn parse_summaries(value: &Value) -> WebResult<Vec<WorkPackageSummary>> {
    let elements = as_object(value)?
        .get("_embedded")
        .and_then(|e| e.get("elements"))
        .and_then(Value::as_array)
        .ok_or_else(|| WebError::Representation("collection without elements".to_string()))?;

    elements
        .iter()
        .map(|item| {
            let obj = as_object(item)?;
            let id = obj
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| WebError::Representation("work package without id".to_string()))?;
            Ok(WorkPackageSummary {
                id: id.into(),
                subject: obj
                    .get("subject")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

/// Body of a PATCH changing a single attribute
///
/// Cleared values are sent as a top-level `null`, which the server accepts
/// for list fields too.
pub fn patch_body(attribute: AttributeKey, value: &FieldValue) -> Value {
    let key = attribute.to_string();
    match value {
        FieldValue::Option(id) => json!({ "_links": { key: { "href": id.href() } } }),
        other => json!({ key: scalar_json(FieldFormat::Text, other) }),
    }
}

/// Why a PATCH body could not be applied
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    BadRequest(String),
    Invalid(ValidationError),
}

/// Extract every custom field change from a PATCH body
pub fn parse_patch(
    body: &Value,
    fields: &[CustomFieldDefinition],
    locale: &Locale,
) -> Result<Vec<(CustomFieldDefinition, FieldValue)>, PatchError> {
    let obj = body
        .as_object()
        .ok_or_else(|| PatchError::BadRequest("request body must be a JSON object".to_string()))?;

    let lookup = |key: &str| -> Result<Option<&CustomFieldDefinition>, PatchError> {
        let Ok(attribute) = key.parse::<AttributeKey>() else {
            return Ok(None);
        };
        fields
            .iter()
            .find(|d| d.id == attribute.custom_field_id())
            .map(Some)
            .ok_or_else(|| PatchError::BadRequest(format!("unknown attribute {}", key)))
    };

    let mut changes = Vec::new();
    for (key, raw) in obj {
        let Some(def) = lookup(key)? else { continue };
        if def.format == FieldFormat::List && raw.is_null() {
            changes.push((def.clone(), FieldValue::Unset));
            continue;
        }
        if def.format == FieldFormat::List {
            return Err(PatchError::BadRequest(format!(
                "{} is a link; set it under _links",
                key
            )));
        }
        let value = decode_canonical(def.format, raw).map_err(|_| malformed(def, locale))?;
        changes.push((def.clone(), value));
    }

    if let Some(links) = obj.get("_links") {
        let links = links
            .as_object()
            .ok_or_else(|| PatchError::BadRequest("_links must be an object".to_string()))?;
        for (key, link) in links {
            let Some(def) = lookup(key)? else { continue };
            if def.format != FieldFormat::List {
                return Err(PatchError::BadRequest(format!("{} is not a link", key)));
            }
            let value = decode_link(link).map_err(|_| malformed(def, locale))?;
            changes.push((def.clone(), value));
        }
    }

    Ok(changes)
}

fn malformed(def: &CustomFieldDefinition, locale: &Locale) -> PatchError {
    let key = match def.format {
        FieldFormat::Int => MessageKey::NotAnInteger,
        FieldFormat::Float => MessageKey::NotANumber,
        _ => MessageKey::Inclusion,
    };
    PatchError::Invalid(ValidationError::malformed(def, key, locale))
}

fn decode_link(link: &Value) -> Result<FieldValue, String> {
    match link.get("href") {
        None | Some(Value::Null) => Ok(FieldValue::Unset),
        Some(Value::String(href)) => CustomOptionId::from_href(href)
            .map(FieldValue::Option)
            .ok_or_else(|| format!("'{}' is not a custom option", href)),
        Some(other) => Err(format!("unexpected href {}", other)),
    }
}

fn decode_canonical(format: FieldFormat, value: &Value) -> Result<FieldValue, String> {
    match (format, value) {
        (_, Value::Null) => Ok(FieldValue::Unset),
        (FieldFormat::Text | FieldFormat::LongText, Value::String(s)) if s.is_empty() => Ok(FieldValue::Unset),
        (FieldFormat::Text | FieldFormat::LongText, Value::String(s)) => Ok(FieldValue::Text(s.clone())),
        (FieldFormat::LongText, Value::Object(o)) => match o.get("raw") {
            Some(Value::String(s)) if !s.is_empty() => Ok(FieldValue::Text(s.clone())),
            Some(Value::String(_)) | Some(Value::Null) | None => Ok(FieldValue::Unset),
            Some(other) => Err(format!("unexpected raw {}", other)),
        },
        (FieldFormat::Int, Value::Number(n)) => n
            .as_i64()
            .map(FieldValue::Integer)
            .ok_or_else(|| format!("{} is not an integer", n)),
        (FieldFormat::Int, Value::String(s)) if s.trim().is_empty() => Ok(FieldValue::Unset),
        (FieldFormat::Int, Value::String(s)) => locale::parse_integer(s)
            .map(FieldValue::Integer)
            .map_err(|_| format!("'{}' is not an integer", s)),
        (FieldFormat::Float, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(FieldValue::Float)
            .ok_or_else(|| format!("{} is not a number", n)),
        (FieldFormat::Float, Value::String(s)) if s.trim().is_empty() => Ok(FieldValue::Unset),
        // Canonical decimals use '.', the English notation
        (FieldFormat::Float, Value::String(s)) => locale::parse_float(s, &Locale::english())
            .map(FieldValue::Float)
            .map_err(|_| format!("'{}' is not a number", s)),
        (format, other) => Err(format!("{} does not fit a {} field", other, format)),
    }
}

fn as_object(value: &Value) -> WebResult<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| WebError::Representation("expected a JSON object".to_string()))
}
