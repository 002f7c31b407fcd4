//! Inplace field: a single attribute that toggles between display and edit
//!
//! ```text
//!   Inactive ──activate──▶ Active ──commit (pre-check fails)──▶ ActiveWithError
//!      ▲                    │  ▲                                   │
//!      │                    │  └──────────── set_value ────────────┤
//!      │              begin_commit                           begin_commit
//!      │                    ▼                                      ▼
//!      └──── success ─── Saving ──── rejection ──────────▶ ActiveWithError
//! ```
//!
//! An edit session exists exactly while the field is not `Inactive`. The
//! displayed value only changes once the collaborator confirms an update.
//! Multi-line editors additionally toggle between writing and a rendered
//! preview, and complete `#` work package references while writing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collaborator::{SuccessNotification, UpdateCollaborator, UpdateRequest};
use crate::i18n::UNSET_PLACEHOLDER;
use crate::locale::{self, Locale};
use crate::references::ReferenceQuery;
use crate::types::{
    AttributeKey, CustomFieldDefinition, EditorKind, FieldValue, WorkPackageId, WorkPackageSummary,
};
use crate::validation::{self, ValidationError};

/// What an inplace field is bound to; fixed for the field's lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub work_package_id: WorkPackageId,
    pub attribute: AttributeKey,
    pub definition: CustomFieldDefinition,
    pub locale: Locale,
}

impl FieldBinding {
    pub fn new(work_package_id: WorkPackageId, definition: CustomFieldDefinition, locale: Locale) -> Self {
        Self {
            work_package_id,
            attribute: definition.attribute_key(),
            definition,
            locale,
        }
    }

    pub fn editor_kind(&self) -> EditorKind {
        self.definition.format.editor_kind()
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

/// Observable state of an inplace field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
    Inactive,
    Active,
    ActiveWithError,
    /// Waiting for the collaborator to answer a commit
    Saving,
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditState::Inactive => "inactive",
            EditState::Active => "active",
            EditState::ActiveWithError => "active_with_error",
            EditState::Saving => "saving",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("field is not being edited")]
    NotActive,

    #[error("a commit is already in flight")]
    CommitInFlight,

    #[error("no commit is in flight")]
    NoCommitInFlight,

    #[error("{0:?} editors have no preview")]
    PreviewUnsupported(EditorKind),

    #[error("editor shows a preview")]
    Previewing,

    #[error("no work package reference is being typed")]
    NoReferenceQuery,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone)]
struct EditSession {
    pending: String,
    error: Option<ValidationError>,
    in_flight: Option<FieldValue>,
    previewing: bool,
}

/// One editable custom field of a work package
#[derive(Debug, Clone)]
pub struct InplaceField {
    binding: FieldBinding,
    displayed: FieldValue,
    session: Option<EditSession>,
}

impl InplaceField {
    pub fn new(binding: FieldBinding, value: FieldValue) -> Self {
        Self {
            binding,
            displayed: value,
            session: None,
        }
    }

    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }

    pub fn state(&self) -> EditState {
        match &self.session {
            None => EditState::Inactive,
            Some(s) if s.in_flight.is_some() => EditState::Saving,
            Some(s) if s.error.is_some() => EditState::ActiveWithError,
            Some(_) => EditState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn displayed_value(&self) -> &FieldValue {
        &self.displayed
    }

    /// Text shown while the field is in display mode
    pub fn display_text(&self) -> String {
        let def = &self.binding.definition;
        match &self.displayed {
            FieldValue::Unset => UNSET_PLACEHOLDER.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => locale::format_integer(*i),
            FieldValue::Float(f) => locale::format_float(*f, &self.binding.locale),
            FieldValue::Option(id) => def
                .option_by_id(*id)
                .map(|o| o.value.clone())
                .unwrap_or_else(|| UNSET_PLACEHOLDER.to_string()),
        }
    }

    /// Current editor content; `None` while inactive
    pub fn editor_value(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.pending.as_str())
    }

    pub fn error(&self) -> Option<&ValidationError> {
        self.session.as_ref().and_then(|s| s.error.as_ref())
    }

    /// Replace the displayed value from a fresh read of the record. An open
    /// editor keeps its pending text.
    pub fn refresh(&mut self, value: FieldValue) -> Result<(), EditError> {
        if self.state() == EditState::Saving {
            return Err(EditError::CommitInFlight);
        }
        self.displayed = value;
        Ok(())
    }

    pub fn activate(&mut self) -> Result<(), EditError> {
        if self.is_active() {
            return match self.state() {
                EditState::Saving => Err(EditError::CommitInFlight),
                _ => Ok(()),
            };
        }
        let pending = self.editor_text(&self.displayed);
        debug!(attribute = %self.binding.attribute, pending = %pending, "activated field");
        self.session = Some(EditSession {
            pending,
            error: None,
            in_flight: None,
            previewing: false,
        });
        Ok(())
    }

    pub fn set_value(&mut self, value: impl Into<String>) -> Result<(), EditError> {
        let session = self.writable_session()?;
        session.pending = value.into();
        Ok(())
    }

    pub fn is_previewing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.previewing)
    }

    /// Switch a multi-line editor between writing and preview. Returns
    /// whether the preview is now shown.
    pub fn toggle_preview(&mut self) -> Result<bool, EditError> {
        let kind = self.binding.editor_kind();
        if !kind.supports_preview() {
            return Err(EditError::PreviewUnsupported(kind));
        }
        let attribute = self.binding.attribute;
        let session = self.editable_session()?;
        session.previewing = !session.previewing;
        debug!(attribute = %attribute, previewing = session.previewing, "preview toggled");
        Ok(session.previewing)
    }

    /// Work package reference being typed at the end of the editor text
    pub fn reference_query(&self) -> Option<ReferenceQuery> {
        if !self.binding.editor_kind().completes_references() {
            return None;
        }
        match &self.session {
            Some(s) if !s.previewing && s.in_flight.is_none() => ReferenceQuery::at_end(&s.pending),
            _ => None,
        }
    }

    /// Replace the reference being typed with a reference to `target`
    pub fn complete_reference(&mut self, target: &WorkPackageSummary) -> Result<(), EditError> {
        let query = self.reference_query().ok_or(EditError::NoReferenceQuery)?;
        let session = self.writable_session()?;
        session.pending = query.complete(&session.pending, target.id);
        debug!(work_package = %target.id, "reference completed");
        Ok(())
    }

    /// Run the local pre-check on the pending value without changing state
    pub fn validity(&self) -> Result<FieldValue, EditError> {
        let session = self.session.as_ref().ok_or(EditError::NotActive)?;
        validation::parse_input(&self.binding.definition, &session.pending, &self.binding.locale)
            .map_err(EditError::from)
    }

    /// Start a commit. On a failed pre-check the field moves to
    /// `ActiveWithError` and no request is produced.
    pub fn begin_commit(&mut self) -> Result<UpdateRequest, EditError> {
        let binding = &self.binding;
        let session = self.session.as_mut().ok_or(EditError::NotActive)?;
        if session.in_flight.is_some() {
            return Err(EditError::CommitInFlight);
        }

        match validation::parse_input(&binding.definition, &session.pending, &binding.locale) {
            Ok(value) => {
                debug!(attribute = %binding.attribute, value = ?value, "commit started");
                session.error = None;
                session.in_flight = Some(value.clone());
                Ok(UpdateRequest {
                    work_package_id: binding.work_package_id,
                    attribute: binding.attribute,
                    value,
                    locale: binding.locale.clone(),
                })
            }
            Err(err) => {
                debug!(attribute = %binding.attribute, error = %err, "commit refused by pre-check");
                session.error = Some(err.clone());
                Err(EditError::Validation(err))
            }
        }
    }

    /// Deliver the collaborator's answer for the commit in flight
    pub fn complete_commit(
        &mut self,
        result: Result<SuccessNotification, ValidationError>,
    ) -> Result<SuccessNotification, EditError> {
        let session = self.session.as_mut().ok_or(EditError::NoCommitInFlight)?;
        let value = session.in_flight.take().ok_or(EditError::NoCommitInFlight)?;

        match result {
            Ok(notification) => {
                info!(attribute = %self.binding.attribute, "field updated");
                self.displayed = value;
                self.session = None;
                Ok(notification)
            }
            Err(err) => {
                warn!(attribute = %self.binding.attribute, error = %err, "update rejected");
                session.error = Some(err.clone());
                Err(EditError::Validation(err))
            }
        }
    }

    /// Pre-check, hand the value to `collaborator`, apply its answer
    pub async fn commit<C>(&mut self, collaborator: &C) -> Result<SuccessNotification, EditError>
    where
        C: UpdateCollaborator + ?Sized,
    {
        let request = self.begin_commit()?;
        let result = collaborator.update(request).await;
        self.complete_commit(result)
    }

    /// Explicit cancel control: discard the pending value
    pub fn cancel_by_action(&mut self) -> Result<(), EditError> {
        if self.state() == EditState::Saving {
            return Err(EditError::CommitInFlight);
        }
        if self.session.take().is_some() {
            debug!(attribute = %self.binding.attribute, "edit cancelled");
        }
        Ok(())
    }

    /// Escape key; multi-line editors keep editing. Returns whether the field
    /// was deactivated.
    pub fn cancel_by_escape(&mut self) -> Result<bool, EditError> {
        if !self.is_active() {
            return Ok(false);
        }
        if !self.binding.editor_kind().cancels_on_escape() {
            return Ok(false);
        }
        self.cancel_by_action()?;
        Ok(true)
    }

    fn editable_session(&mut self) -> Result<&mut EditSession, EditError> {
        match self.session.as_mut() {
            None => Err(EditError::NotActive),
            Some(s) if s.in_flight.is_some() => Err(EditError::CommitInFlight),
            Some(s) => Ok(s),
        }
    }

    fn writable_session(&mut self) -> Result<&mut EditSession, EditError> {
        let session = self.editable_session()?;
        if session.previewing {
            return Err(EditError::Previewing);
        }
        Ok(session)
    }

    fn editor_text(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Unset => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => locale::format_integer(*i),
            FieldValue::Float(f) => locale::format_float_input(*f, &self.binding.locale),
            FieldValue::Option(id) => id.href(),
        }
    }
}
