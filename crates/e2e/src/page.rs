//! A work package page: one inplace field per custom field plus a
//! notification area, with preview and reference autocomplete for long
//! text editors

use inplace_common::{
    EditError, FieldBinding, InplaceField, Locale, SeededFixture, UpdateCollaborator, WorkPackage,
    WorkPackageId, WorkPackageSummary,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::backend::Backend;
use crate::error::{E2eError, E2eResult};
use crate::spec::NotificationType;

/// The toast shown after a submit; a newer one replaces the older
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationType,
    pub message: String,
}

pub struct WorkPackagePage {
    work_package_id: WorkPackageId,
    locale: Locale,
    fields: BTreeMap<String, InplaceField>,
    notification: Option<Notification>,
    previews: BTreeMap<String, String>,
}

impl WorkPackagePage {
    /// Bind every seeded field to the work package as currently stored
    pub fn new(seeded: &SeededFixture, wp: &WorkPackage, locale: Locale) -> Self {
        let fields = seeded
            .fields
            .iter()
            .map(|(name, def)| {
                let binding = FieldBinding::new(wp.id, def.clone(), locale.clone());
                let field = InplaceField::new(binding, wp.custom_value(def.id).clone());
                (name.clone(), field)
            })
            .collect();

        Self {
            work_package_id: wp.id,
            locale,
            fields,
            notification: None,
            previews: BTreeMap::new(),
        }
    }

    pub fn work_package_id(&self) -> WorkPackageId {
        self.work_package_id
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn field(&self, name: &str) -> E2eResult<&InplaceField> {
        self.fields
            .get(name)
            .ok_or_else(|| E2eError::UnknownField(name.to_string()))
    }

    /// Look a field up by name or by its `customField<id>` key
    pub fn field_by_attribute(&self, key: &str) -> E2eResult<&InplaceField> {
        if let Some(field) = self.fields.get(key) {
            return Ok(field);
        }
        self.fields
            .values()
            .find(|f| f.binding().attribute.to_string() == key)
            .ok_or_else(|| E2eError::UnknownField(key.to_string()))
    }

    pub fn field_mut(&mut self, name: &str) -> E2eResult<&mut InplaceField> {
        self.fields
            .get_mut(name)
            .ok_or_else(|| E2eError::UnknownField(name.to_string()))
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    pub fn activate(&mut self, name: &str) -> E2eResult<()> {
        Ok(self.field_mut(name)?.activate()?)
    }

    pub fn set_value(&mut self, name: &str, value: &str) -> E2eResult<()> {
        Ok(self.field_mut(name)?.set_value(value)?)
    }

    /// Press the save control. Validation failures are part of the page
    /// state (inline error and error toast), not errors of the call.
    pub async fn submit<C>(&mut self, name: &str, collaborator: &C) -> E2eResult<()>
    where
        C: UpdateCollaborator + ?Sized,
    {
        let result = self.field_mut(name)?.commit(collaborator).await;
        match result {
            Ok(notice) => {
                self.notify(NotificationType::Success, notice.message);
                Ok(())
            }
            Err(EditError::Validation(err)) => {
                self.notify(NotificationType::Error, err.message);
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Press Enter: single-line inputs submit, multi-line editors get a newline
    pub async fn submit_by_enter<C>(&mut self, name: &str, collaborator: &C) -> E2eResult<()>
    where
        C: UpdateCollaborator + ?Sized,
    {
        let kind = self.field(name)?.binding().editor_kind();
        if kind.submits_on_enter() {
            return self.submit(name, collaborator).await;
        }
        let field = self.field_mut(name)?;
        match field.editor_value().map(str::to_string) {
            Some(text) if kind == inplace_common::EditorKind::Textarea => {
                Ok(field.set_value(text + "\n")?)
            }
            Some(_) => Err(E2eError::StepFailed {
                step: format!("submit_by_enter {}", name),
                reason: format!("Enter does not submit a {:?} editor", kind),
            }),
            None => Err(EditError::NotActive.into()),
        }
    }

    /// Click the preview toggle; entering preview renders the pending text.
    /// Returns whether the field now shows the preview.
    pub async fn toggle_preview<B>(&mut self, name: &str, backend: &B) -> E2eResult<bool>
    where
        B: Backend + ?Sized,
    {
        let field = self.field_mut(name)?;
        let previewing = field.toggle_preview()?;
        if !previewing {
            self.previews.remove(name);
            return Ok(false);
        }

        let text = field.editor_value().unwrap_or_default().to_string();
        let html = backend.render_preview(&text).await?;
        debug!(field = name, bytes = html.len(), "preview rendered");
        self.previews.insert(name.to_string(), html);
        Ok(true)
    }

    /// Rendered preview, while the field shows one
    pub fn preview(&self, name: &str) -> E2eResult<Option<&str>> {
        if !self.field(name)?.is_previewing() {
            return Ok(None);
        }
        Ok(self.previews.get(name).map(String::as_str))
    }

    /// Suggestions for the reference being typed, empty when there is none
    pub async fn autocomplete<B>(&self, name: &str, backend: &B) -> E2eResult<Vec<WorkPackageSummary>>
    where
        B: Backend + ?Sized,
    {
        match self.field(name)?.reference_query() {
            Some(query) => backend.search_work_packages(&query.term).await,
            None => Ok(Vec::new()),
        }
    }

    /// Pick the suggestion with `subject` from the autocomplete list
    pub async fn select_autocomplete<B>(&mut self, name: &str, subject: &str, backend: &B) -> E2eResult<()>
    where
        B: Backend + ?Sized,
    {
        let suggestions = self.autocomplete(name, backend).await?;
        let target = suggestions
            .iter()
            .find(|s| s.subject == subject)
            .ok_or_else(|| E2eError::StepFailed {
                step: format!("select_autocomplete {}", name),
                reason: format!("no suggestion '{}' among {:?}", subject, suggestions),
            })?;
        Ok(self.field_mut(name)?.complete_reference(target)?)
    }

    /// Press Escape; returns whether the field left edit mode
    pub fn cancel_by_escape(&mut self, name: &str) -> E2eResult<bool> {
        Ok(self.field_mut(name)?.cancel_by_escape()?)
    }

    pub fn cancel_by_click(&mut self, name: &str) -> E2eResult<()> {
        Ok(self.field_mut(name)?.cancel_by_action()?)
    }

    /// Show the values of a fresh read of the work package
    pub fn refresh(&mut self, wp: &WorkPackage) -> E2eResult<()> {
        for field in self.fields.values_mut() {
            let id = field.binding().definition.id;
            field.refresh(wp.custom_value(id).clone())?;
        }
        Ok(())
    }

    fn notify(&mut self, kind: NotificationType, message: String) {
        debug!(kind = ?kind, message = %message, "notification");
        self.notification = Some(Notification { kind, message });
    }
}
