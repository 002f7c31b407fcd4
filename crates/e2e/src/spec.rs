//! Declarative YAML scenario specification

use inplace_common::{EditorKind, FieldFormat, FixtureSpec, FixtureValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Session locale of the page, e.g. `en` or `de`
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Custom fields and the work package to edit
    #[serde(default)]
    pub fixture: FixtureSpec,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

fn default_locale() -> String {
    "en".to_string()
}

/// A single step in a scenario; `field` names a custom field of the fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Switch the field into edit mode
    Activate { field: String },

    /// Replace the editor content
    SetValue { field: String, value: String },

    /// Press the save control
    Submit { field: String },

    /// Press Enter inside the editor
    SubmitByEnter { field: String },

    /// Activate, type `value` and submit
    Update { field: String, value: String },

    /// Press Escape inside the editor
    CancelByEscape { field: String },

    /// Press the cancel control
    CancelByClick { field: String },

    ExpectActive { field: String },

    ExpectInactive { field: String },

    /// The field stays in edit mode with an inline error
    ExpectInvalid {
        field: String,
        #[serde(default)]
        message: Option<String>,
    },

    /// Text shown in display mode
    ExpectStateText { field: String, text: String },

    /// Editor content; `option` expects the href of the option with that label
    ExpectValue {
        field: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        option: Option<String>,
    },

    /// Displayed text per attribute; keys are `customField<id>` or field names
    ExpectAttributes { values: BTreeMap<String, String> },

    /// Static properties of the bound field
    ExpectBinding {
        field: String,
        #[serde(default)]
        format: Option<FieldFormat>,
        #[serde(default)]
        editor: Option<EditorKind>,
        #[serde(default)]
        required: Option<bool>,
    },

    /// Click the preview toggle of a long text editor
    TogglePreview { field: String },

    /// The preview is shown and its HTML contains every fragment
    ExpectPreview {
        field: String,
        #[serde(default)]
        contains: Vec<String>,
    },

    ExpectNoPreview { field: String },

    /// Subjects offered for the reference being typed, in order
    ExpectAutocomplete {
        field: String,
        #[serde(default)]
        suggestions: Vec<String>,
    },

    /// Pick the autocomplete suggestion with this subject
    SelectAutocomplete { field: String, subject: String },

    /// The visible notification
    ExpectNotification {
        #[serde(rename = "type")]
        kind: NotificationType,
        #[serde(default)]
        message: Option<String>,
    },

    DismissNotification,

    /// Number of requests the update collaborator has seen so far
    ExpectUpdateCalls { count: usize },

    /// Stored value, read back from the backend; `null` expects no value
    ExpectPersisted {
        field: String,
        #[serde(default)]
        value: Option<FixtureValue>,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Success,
    Error,
}

impl ScenarioStep {
    /// Short label for results and logs, e.g. `update MyNumber`
    pub fn label(&self) -> String {
        let action = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("action").and_then(|a| a.as_str()).map(str::to_string))
            .unwrap_or_else(|| "step".to_string());
        match self.field() {
            Some(field) => format!("{} {}", action, field),
            None => action,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ScenarioStep::Activate { field }
            | ScenarioStep::SetValue { field, .. }
            | ScenarioStep::Submit { field }
            | ScenarioStep::SubmitByEnter { field }
            | ScenarioStep::Update { field, .. }
            | ScenarioStep::CancelByEscape { field }
            | ScenarioStep::CancelByClick { field }
            | ScenarioStep::ExpectActive { field }
            | ScenarioStep::ExpectInactive { field }
            | ScenarioStep::ExpectInvalid { field, .. }
            | ScenarioStep::ExpectStateText { field, .. }
            | ScenarioStep::ExpectValue { field, .. }
            | ScenarioStep::ExpectBinding { field, .. }
            | ScenarioStep::TogglePreview { field }
            | ScenarioStep::ExpectPreview { field, .. }
            | ScenarioStep::ExpectNoPreview { field }
            | ScenarioStep::ExpectAutocomplete { field, .. }
            | ScenarioStep::SelectAutocomplete { field, .. }
            | ScenarioStep::ExpectPersisted { field, .. } => Some(field.as_str()),
            ScenarioStep::ExpectAttributes { .. }
            | ScenarioStep::ExpectNotification { .. }
            | ScenarioStep::DismissNotification
            | ScenarioStep::ExpectUpdateCalls { .. }
            | ScenarioStep::Log { .. } => None,
        }
    }
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, ordered by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
