//! HTTP client for the work package API

use async_trait::async_trait;
use inplace_common::i18n::{self, MessageKey};
use inplace_common::{
    CustomFieldDefinition, CustomFieldId, FixtureSpec, Locale, SeededFixture, SuccessNotification,
    UpdateCollaborator, UpdateRequest, ValidationError, WorkPackage, WorkPackageId,
    WorkPackageSummary,
};
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ApiErrorBody, WebError, WebResult};
use crate::representation;

/// Update collaborator that PATCHes work packages over HTTP
#[derive(Clone)]
pub struct HttpCollaborator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCollaborator {
    pub fn new(base_url: impl Into<String>) -> WebResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> WebResult<serde_json::Value> {
        let response = self.client.get(self.url("/health")).send().await?;
        Self::json(response).await
    }

    pub async fn get_custom_field(&self, id: CustomFieldId) -> WebResult<CustomFieldDefinition> {
        let response = self
            .client
            .get(self.url(&format!("/api/v3/custom_fields/{}", id)))
            .send()
            .await?;
        representation::parse_custom_field(&Self::json(response).await?)
    }

    /// Fetch a work package, decoding the values of `fields`
    pub async fn get_work_package(
        &self,
        id: WorkPackageId,
        fields: &[CustomFieldDefinition],
    ) -> WebResult<WorkPackage> {
        let response = self
            .client
            .get(self.url(&representation::work_package_href(id)))
            .send()
            .await?;
        representation::parse_work_package(&Self::json(response).await?, fields)
    }

    /// Work packages whose id or subject matches `term`
    pub async fn search_work_packages(&self, term: &str) -> WebResult<Vec<WorkPackageSummary>> {
        let response = self
            .client
            .get(self.url("/api/v3/work_packages"))
            .query(&[("q", term)])
            .send()
            .await?;
        representation::parse_summaries(&Self::json(response).await?)
    }

    /// Preview HTML for formatted text
    pub async fn render_preview(&self, text: &str) -> WebResult<String> {
        let response = self
            .client
            .post(self.url("/api/v3/render/markdown"))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(text.to_string())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Seed a fixture on a server running in test mode
    pub async fn seed_fixture(&self, spec: &FixtureSpec) -> WebResult<SeededFixture> {
        let response = self
            .client
            .post(self.url("/api/test/fixtures"))
            .json(spec)
            .send()
            .await?;
        let body = Self::json(response).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn json(response: reqwest::Response) -> WebResult<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.message,
                Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
            };
            return Err(WebError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn patch(&self, request: &UpdateRequest) -> WebResult<Result<(), ValidationError>> {
        let response = self
            .client
            .patch(self.url(&representation::work_package_href(request.work_package_id)))
            .header(ACCEPT_LANGUAGE, accept_language(&request.locale))
            .json(&representation::patch_body(request.attribute, &request.value))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Ok(())),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body: ApiErrorBody = response.json().await?;
                Ok(Err(body.into_validation_error()))
            }
            status => {
                let message = response
                    .json::<ApiErrorBody>()
                    .await
                    .map(|b| b.message)
                    .unwrap_or_default();
                Err(WebError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

fn accept_language(locale: &Locale) -> String {
    locale.canonical().replace('_', "-")
}

#[async_trait]
impl UpdateCollaborator for HttpCollaborator {
    async fn update(&self, request: UpdateRequest) -> Result<SuccessNotification, ValidationError> {
        debug!(
            work_package = %request.work_package_id,
            attribute = %request.attribute,
            "sending update"
        );
        match self.patch(&request).await {
            Ok(Ok(())) => Ok(SuccessNotification {
                message: i18n::notice_successful_update(&request.locale),
            }),
            Ok(Err(err)) => Err(err),
            Err(e) => {
                warn!(
                    work_package = %request.work_package_id,
                    attribute = %request.attribute,
                    "update request failed: {}",
                    e
                );
                Err(ValidationError::rejected(
                    Some(request.attribute),
                    i18n::message(
                        MessageKey::Rejected,
                        &request.locale,
                        &request.attribute.to_string(),
                        None,
                    ),
                ))
            }
        }
    }
}
