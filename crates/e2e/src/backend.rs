//! Where scenarios store their data: in-process or behind the HTTP API

use async_trait::async_trait;
use inplace_common::{
    CustomFieldDefinition, Database, Error, FixtureSpec, SeededFixture, UpdateCollaborator,
    UpdateService, WorkPackage, WorkPackageId, WorkPackageSummary,
};
use inplace_common::references::{self, AUTOCOMPLETE_LIMIT};
use inplace_web::HttpCollaborator;
use std::sync::Arc;

use crate::error::E2eResult;

/// Seeds fixtures, reads work packages back and hands out the update
/// collaborator the page submits to
#[async_trait]
pub trait Backend: Send + Sync {
    async fn seed(&self, fixture: &FixtureSpec) -> E2eResult<SeededFixture>;

    async fn work_package(
        &self,
        id: WorkPackageId,
        fields: &[CustomFieldDefinition],
    ) -> E2eResult<WorkPackage>;

    fn collaborator(&self) -> Arc<dyn UpdateCollaborator>;

    /// Autocomplete candidates for a `#` reference
    async fn search_work_packages(&self, term: &str) -> E2eResult<Vec<WorkPackageSummary>>;

    /// Preview HTML for formatted text
    async fn render_preview(&self, text: &str) -> E2eResult<String>;
}

/// Backend on a private in-memory database
#[derive(Clone)]
pub struct LocalBackend {
    service: UpdateService,
}

impl LocalBackend {
    pub fn new() -> E2eResult<Self> {
        Ok(Self {
            service: UpdateService::new(Database::open_memory()?),
        })
    }

    pub fn database(&self) -> &Database {
        self.service.database()
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn seed(&self, fixture: &FixtureSpec) -> E2eResult<SeededFixture> {
        Ok(fixture.apply(self.database())?)
    }

    async fn work_package(
        &self,
        id: WorkPackageId,
        _fields: &[CustomFieldDefinition],
    ) -> E2eResult<WorkPackage> {
        let wp = self
            .database()
            .get_work_package(id)?
            .ok_or_else(|| Error::not_found("work_package", id))?;
        Ok(wp)
    }

    fn collaborator(&self) -> Arc<dyn UpdateCollaborator> {
        Arc::new(self.service.clone())
    }

    async fn search_work_packages(&self, term: &str) -> E2eResult<Vec<WorkPackageSummary>> {
        Ok(self.database().search_work_packages(term, AUTOCOMPLETE_LIMIT)?)
    }

    async fn render_preview(&self, text: &str) -> E2eResult<String> {
        let db = self.database();
        Ok(references::render_preview(text, |id| db.work_package_subject(id))?)
    }
}

/// Backend talking to a running `inplace-web` in test mode
#[derive(Clone)]
pub struct RemoteBackend {
    client: HttpCollaborator,
}

impl RemoteBackend {
    pub fn new(base_url: impl Into<String>) -> E2eResult<Self> {
        Ok(Self {
            client: HttpCollaborator::new(base_url)?,
        })
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn seed(&self, fixture: &FixtureSpec) -> E2eResult<SeededFixture> {
        Ok(self.client.seed_fixture(fixture).await?)
    }

    async fn work_package(
        &self,
        id: WorkPackageId,
        fields: &[CustomFieldDefinition],
    ) -> E2eResult<WorkPackage> {
        Ok(self.client.get_work_package(id, fields).await?)
    }

    fn collaborator(&self) -> Arc<dyn UpdateCollaborator> {
        Arc::new(self.client.clone())
    }

    async fn search_work_packages(&self, term: &str) -> E2eResult<Vec<WorkPackageSummary>> {
        Ok(self.client.search_work_packages(term).await?)
    }

    async fn render_preview(&self, text: &str) -> E2eResult<String> {
        Ok(self.client.render_preview(text).await?)
    }
}
