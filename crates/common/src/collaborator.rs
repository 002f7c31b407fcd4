//! The seam between an inplace field and whatever persists its value

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::locale::Locale;
use crate::types::{AttributeKey, FieldValue, WorkPackageId};
use crate::validation::ValidationError;

/// One attribute change submitted by an inplace field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub work_package_id: WorkPackageId,
    pub attribute: AttributeKey,
    pub value: FieldValue,
    pub locale: Locale,
}

/// Confirmation surfaced to the user after a successful update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessNotification {
    pub message: String,
}

/// Validates and persists attribute changes
#[async_trait]
pub trait UpdateCollaborator: Send + Sync {
    async fn update(&self, request: UpdateRequest) -> Result<SuccessNotification, ValidationError>;
}

#[async_trait]
impl<T: UpdateCollaborator + ?Sized> UpdateCollaborator for Arc<T> {
    async fn update(&self, request: UpdateRequest) -> Result<SuccessNotification, ValidationError> {
        (**self).update(request).await
    }
}

/// Records every request before forwarding it
pub struct CountingCollaborator<C> {
    inner: C,
    calls: Mutex<Vec<UpdateRequest>>,
}

impl<C: UpdateCollaborator> CountingCollaborator<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<UpdateRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl<C: UpdateCollaborator> UpdateCollaborator for CountingCollaborator<C> {
    async fn update(&self, request: UpdateRequest) -> Result<SuccessNotification, ValidationError> {
        self.calls.lock().push(request.clone());
        self.inner.update(request).await
    }
}
