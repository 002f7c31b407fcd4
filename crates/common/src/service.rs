//! Reference update collaborator backed by the database

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::collaborator::{SuccessNotification, UpdateCollaborator, UpdateRequest};
use crate::db::Database;
use crate::error::Error;
use crate::i18n::{self, MessageKey};
use crate::locale::Locale;
use crate::types::{AttributeKey, CustomFieldDefinition, FieldValue, WorkPackageId};
use crate::validation::{self, ValidationError};

/// Validates custom value changes and writes them to the database
#[derive(Clone)]
pub struct UpdateService {
    db: Database,
}

impl UpdateService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn apply(&self, request: &UpdateRequest) -> Result<SuccessNotification, ValidationError> {
        let def = self
            .db
            .get_custom_field(request.attribute.custom_field_id())
            .map_err(|e| storage_failure(request.work_package_id, Some(request.attribute), &request.locale, e))?
            .ok_or_else(|| not_found(Some(request.attribute), &request.locale))?;

        self.apply_changes(
            request.work_package_id,
            &[(def, request.value.clone())],
            &request.locale,
        )?;
        Ok(SuccessNotification {
            message: i18n::notice_successful_update(&request.locale),
        })
    }

    /// Validate every change, then write them all in one transaction.
    /// Returns the work package's lock version afterwards.
    pub fn apply_changes(
        &self,
        work_package_id: WorkPackageId,
        changes: &[(CustomFieldDefinition, FieldValue)],
        locale: &Locale,
    ) -> Result<i64, ValidationError> {
        let attribute = changes.first().map(|(def, _)| def.attribute_key());

        let current = self
            .db
            .get_work_package(work_package_id)
            .map_err(|e| storage_failure(work_package_id, attribute, locale, e))?
            .ok_or_else(|| not_found(attribute, locale))?;
        if changes.is_empty() {
            return Ok(current.lock_version);
        }

        for (def, value) in changes {
            validation::validate_value(def, value, locale)?;
        }

        let values: Vec<_> = changes
            .iter()
            .map(|(def, value)| (def.id, value.clone()))
            .collect();
        let lock_version = self
            .db
            .set_custom_values(work_package_id, &values)
            .map_err(|e| match e {
                Error::NotFound { .. } => not_found(attribute, locale),
                other => storage_failure(work_package_id, attribute, locale, other),
            })?;

        for (def, _) in changes {
            info!(
                work_package = %work_package_id,
                attribute = %def.attribute_key(),
                lock_version,
                "custom value updated"
            );
        }
        Ok(lock_version)
    }
}

fn not_found(attribute: Option<AttributeKey>, locale: &Locale) -> ValidationError {
    ValidationError::rejected(
        attribute,
        i18n::message(MessageKey::NotFound, locale, "", None),
    )
}

fn storage_failure(
    work_package_id: WorkPackageId,
    attribute: Option<AttributeKey>,
    locale: &Locale,
    e: Error,
) -> ValidationError {
    let name = attribute.map(|a| a.to_string()).unwrap_or_default();
    error!(work_package = %work_package_id, attribute = %name, "update failed: {}", e);
    ValidationError::rejected(
        attribute,
        i18n::message(MessageKey::Rejected, locale, &name, None),
    )
}

#[async_trait]
impl UpdateCollaborator for UpdateService {
    async fn update(&self, request: UpdateRequest) -> Result<SuccessNotification, ValidationError> {
        self.apply(&request).map_err(|e| {
            warn!(
                work_package = %request.work_package_id,
                attribute = %request.attribute,
                kind = %e.kind,
                "update refused: {}",
                e.message
            );
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomFieldId, FieldFormat};
    use crate::validation::ValidationErrorKind;

    fn setup(min: Option<u32>, max: Option<u32>) -> (UpdateService, CustomFieldDefinition, WorkPackageId) {
        let db = Database::open_memory().unwrap();
        let def = db
            .insert_custom_field(&CustomFieldDefinition {
                id: CustomFieldId(0),
                name: "MyNumber".to_string(),
                format: FieldFormat::Int,
                is_required: false,
                min_length: min,
                max_length: max,
                possible_values: vec![],
            })
            .unwrap();
        let wp = db.create_work_package("Inplace").unwrap();
        (UpdateService::new(db), def, wp)
    }

    fn request(def: &CustomFieldDefinition, wp: WorkPackageId, value: FieldValue, locale: &str) -> UpdateRequest {
        UpdateRequest {
            work_package_id: wp,
            attribute: def.attribute_key(),
            value,
            locale: Locale::parse(locale).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_update_persists() {
        let (service, def, wp) = setup(Some(2), Some(5));
        let notice = service
            .update(request(&def, wp, FieldValue::Integer(9999), "en"))
            .await
            .unwrap();
        assert_eq!(notice.message, "Successful update.");

        let stored = service.database().get_work_package(wp).unwrap().unwrap();
        assert_eq!(stored.custom_value(def.id), &FieldValue::Integer(9999));
    }

    #[tokio::test]
    async fn test_update_rejects_length() {
        let (service, def, wp) = setup(Some(2), Some(5));
        let err = service
            .update(request(&def, wp, FieldValue::Integer(123456), "en"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLong);

        let stored = service.database().get_work_package(wp).unwrap().unwrap();
        assert!(stored.custom_value(def.id).is_unset());
        assert_eq!(stored.lock_version, 0);
    }

    #[tokio::test]
    async fn test_localized_messages() {
        let (service, def, wp) = setup(None, Some(2));
        let err = service
            .update(request(&def, wp, FieldValue::Integer(123), "de"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "MyNumber ist zu lang (nicht mehr als 2 Zeichen).");
        let ok = service
            .update(request(&def, wp, FieldValue::Integer(12), "de"))
            .await
            .unwrap();
        assert_eq!(ok.message, "Erfolgreich aktualisiert.");
    }

    #[test]
    fn test_apply_changes_validates_all_first() {
        let (service, def, wp) = setup(Some(2), Some(5));
        let en = Locale::english();
        let err = service
            .apply_changes(
                wp,
                &[
                    (def.clone(), FieldValue::Integer(12)),
                    (def.clone(), FieldValue::Integer(1234567)),
                ],
                &en,
            )
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLong);
        let stored = service.database().get_work_package(wp).unwrap().unwrap();
        assert!(stored.custom_value(def.id).is_unset());

        let lock_version = service
            .apply_changes(wp, &[(def.clone(), FieldValue::Integer(12))], &en)
            .unwrap();
        assert_eq!(lock_version, 1);
    }

    #[test]
    fn test_apply_changes_rolls_back_storage_failure() {
        let (service, def, wp) = setup(None, None);
        let missing = CustomFieldDefinition {
            id: CustomFieldId(404),
            ..def.clone()
        };
        let err = service
            .apply_changes(
                wp,
                &[(def.clone(), FieldValue::Integer(1)), (missing, FieldValue::Integer(2))],
                &Locale::english(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Rejected);

        let stored = service.database().get_work_package(wp).unwrap().unwrap();
        assert!(stored.custom_value(def.id).is_unset());
        assert_eq!(stored.lock_version, 0);
    }

    #[tokio::test]
    async fn test_unknown_targets() {
        let (service, def, _) = setup(None, None);
        let err = service
            .update(request(&def, WorkPackageId(77), FieldValue::Integer(1), "en"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Rejected);

        let mut req = request(&def, WorkPackageId(1), FieldValue::Integer(1), "en");
        req.attribute = AttributeKey::new(CustomFieldId(404));
        let err = service.update(req).await.unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Rejected);
    }
}
