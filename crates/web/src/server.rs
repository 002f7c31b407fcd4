//! Web server implementation

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use inplace_common::references::{self, AUTOCOMPLETE_LIMIT};
use inplace_common::{
    CustomFieldId, CustomOptionId, Database, FixtureSpec, Locale, UpdateService, WorkPackageId,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::WebConfig;
use crate::error::ApiError;
use crate::representation::{self, PatchError};

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
}

struct WebServerState {
    db: Database,
    service: UpdateService,
    cfg: WebConfig,
}

pub async fn serve(cfg: WebConfig) -> anyhow::Result<()> {
    let addr = cfg.listen;
    let server = WebServer::new(cfg)?;
    server.serve(addr).await
}

impl WebServer {
    /// Create a new web server on the configured database
    pub fn new(cfg: WebConfig) -> anyhow::Result<Self> {
        let db = Database::open(&cfg.db_path)?;
        Ok(Self::with_database(cfg, db))
    }

    /// Create a web server on an already opened database
    pub fn with_database(cfg: WebConfig, db: Database) -> Self {
        Self {
            state: Arc::new(WebServerState {
                service: UpdateService::new(db.clone()),
                db,
                cfg,
            }),
        }
    }

    pub fn database(&self) -> &Database {
        &self.state.db
    }

    /// Create router
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/api/v3/work_packages", get(search_work_packages_handler))
            .route(
                "/api/v3/work_packages/:id",
                get(get_work_package_handler).patch(patch_work_package_handler),
            )
            .route("/api/v3/custom_fields/:id", get(get_custom_field_handler))
            .route("/api/v3/custom_options/:id", get(get_custom_option_handler))
            .route("/api/v3/render/markdown", post(render_preview_handler));

        if self.state.cfg.test_mode {
            router = router.route("/api/test/fixtures", post(seed_fixture_handler));
        }

        router
            .fallback(not_found_handler)
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Inplace web API starting on http://{}", addr);
        if self.state.cfg.test_mode {
            warn!("test mode enabled: fixture seeding is exposed");
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

impl WebServerState {
    /// Locale from Accept-Language, else the configured default
    fn request_locale(&self, headers: &HeaderMap) -> Locale {
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(Locale::from_accept_language)
            .unwrap_or_else(|| self.cfg.default_locale.clone())
    }

    fn render_work_package(&self, id: WorkPackageId) -> Result<serde_json::Value, ApiError> {
        let wp = self
            .db
            .get_work_package(id)?
            .ok_or_else(|| ApiError::not_found(format!("work package {} not found", id)))?;
        let fields = self.db.list_custom_fields()?;
        Ok(representation::render_work_package(&wp, &fields))
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inplace-web",
        "version": inplace_common::VERSION,
    }))
}

async fn get_work_package_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state.render_work_package(WorkPackageId(id))?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

/// Work packages matching a `#` reference query
async fn search_work_packages_handler(
    State(state): State<Arc<WebServerState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let term = params.q.trim();
    let found = if term.is_empty() {
        Vec::new()
    } else {
        state.db.search_work_packages(term, AUTOCOMPLETE_LIMIT)?
    };
    debug!(term, found = found.len(), "work package search");
    Ok(Json(representation::render_summaries(&found)))
}

/// Render formatted text the way the editor preview shows it
async fn render_preview_handler(
    State(state): State<Arc<WebServerState>>,
    text: String,
) -> Result<impl IntoResponse, ApiError> {
    let html = references::render_preview(&text, |id| state.db.work_package_subject(id))?;
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html))
}

/// Apply every custom value change in the body, or none of them
///
/// All values are validated before the first write, and the writes share
/// one transaction, so a failure on one attribute leaves the work package
/// untouched.
async fn patch_work_package_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let id = WorkPackageId(id);
    let locale = state.request_locale(&headers);
    let body: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?;

    if state.db.get_work_package(id)?.is_none() {
        return Err(ApiError::not_found(format!("work package {} not found", id)));
    }

    let fields = state.db.list_custom_fields()?;
    let changes = representation::parse_patch(&body, &fields, &locale).map_err(|e| match e {
        PatchError::BadRequest(message) => ApiError::bad_request(message),
        PatchError::Invalid(err) => ApiError::validation(err),
    })?;

    let lock_version = state
        .service
        .apply_changes(id, &changes, &locale)
        .map_err(ApiError::validation)?;

    debug!(work_package = %id, lock_version, "work package patched");
    Ok(Json(state.render_work_package(id)?))
}

async fn get_custom_field_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let def = state
        .db
        .get_custom_field(CustomFieldId(id))?
        .ok_or_else(|| ApiError::not_found(format!("custom field {} not found", id)))?;
    Ok(Json(representation::render_custom_field(&def)))
}

async fn get_custom_option_handler(
    State(state): State<Arc<WebServerState>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    let option = state
        .db
        .get_custom_option(CustomOptionId(id))?
        .ok_or_else(|| ApiError::not_found(format!("custom option {} not found", id)))?;
    Ok(Json(representation::render_custom_option(&option)))
}

async fn seed_fixture_handler(
    State(state): State<Arc<WebServerState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let spec: FixtureSpec = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid fixture: {}", e)))?;
    let seeded = spec.apply(&state.db)?;
    Ok((StatusCode::CREATED, Json(seeded)))
}

async fn not_found_handler() -> impl IntoResponse {
    ApiError::not_found("The requested resource could not be found.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use inplace_common::{FieldValue, SeededFixture};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const FIXTURE: &str = r#"{
        "custom_fields": [
            {"name": "MyNumber", "format": "int", "min_length": 2, "max_length": 5},
            {"name": "Letters", "format": "list", "possible_values": ["X", "Y", "Z"]},
            {"name": "MyFloat", "format": "float"}
        ],
        "work_package": {"custom_values": {"Letters": "Y"}}
    }"#;

    fn setup(test_mode: bool) -> (WebServer, SeededFixture) {
        let db = Database::open_memory().unwrap();
        let spec: FixtureSpec = serde_json::from_str(FIXTURE).unwrap();
        let seeded = spec.apply(&db).unwrap();
        let cfg = WebConfig {
            test_mode,
            ..WebConfig::default()
        };
        (WebServer::with_database(cfg, db), seeded)
    }

    async fn send(server: &WebServer, request: Request<Body>) -> (StatusCode, Value) {
        let response = server.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn patch(id: WorkPackageId, body: Value, language: &str) -> Request<Body> {
        Request::builder()
            .method(Method::PATCH)
            .uri(format!("/api/v3/work_packages/{}", id))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT_LANGUAGE, language)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (server, _) = setup(false);
        let (status, body) = send(&server, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_get_work_package() {
        let (server, seeded) = setup(false);
        let letters = seeded.field("Letters").unwrap();
        let (status, body) = send(
            &server,
            get(&format!("/api/v3/work_packages/{}", seeded.work_package_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key = letters.attribute_key().to_string();
        assert_eq!(body["_links"][&key]["title"], "Y");
        assert_eq!(
            body["_links"][&key]["href"],
            letters.option_by_value("Y").unwrap().href()
        );

        let (status, body) = send(&server, get("/api/v3/work_packages/999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errorIdentifier"], crate::error::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_persists() {
        let (server, seeded) = setup(false);
        let number = seeded.field("MyNumber").unwrap();
        let key = number.attribute_key().to_string();

        let (status, body) = send(&server, patch(seeded.work_package_id, json!({ &key: 9999 }), "en")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[&key], 9999);
        assert_eq!(body["lockVersion"], 2);

        let wp = server.database().get_work_package(seeded.work_package_id).unwrap().unwrap();
        assert_eq!(wp.custom_value(number.id), &FieldValue::Integer(9999));
    }

    #[tokio::test]
    async fn test_patch_constraint_violation() {
        let (server, seeded) = setup(false);
        let number = seeded.field("MyNumber").unwrap();
        let key = number.attribute_key().to_string();

        let (status, body) = send(&server, patch(seeded.work_package_id, json!({ &key: 123456 }), "en")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errorIdentifier"], crate::error::CONSTRAINT_VIOLATION);
        assert_eq!(body["message"], "MyNumber is too long (maximum is 5 characters).");
        assert_eq!(body["_embedded"]["details"]["attribute"], key.as_str());
        assert_eq!(body["_embedded"]["details"]["kind"], "too_long");

        let (_, body) = send(&server, patch(seeded.work_package_id, json!({ &key: 1 }), "de-DE,de;q=0.9")).await;
        assert_eq!(body["message"], "MyNumber ist zu kurz (nicht weniger als 2 Zeichen).");

        let wp = server.database().get_work_package(seeded.work_package_id).unwrap().unwrap();
        assert!(wp.custom_value(number.id).is_unset());
    }

    #[tokio::test]
    async fn test_patch_is_all_or_nothing() {
        let (server, seeded) = setup(false);
        let number = seeded.field("MyNumber").unwrap();
        let float = seeded.field("MyFloat").unwrap();
        let body = json!({
            float.attribute_key().to_string(): 1.5,
            number.attribute_key().to_string(): 1234567,
        });

        let (status, _) = send(&server, patch(seeded.work_package_id, body, "en")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let wp = server.database().get_work_package(seeded.work_package_id).unwrap().unwrap();
        assert!(wp.custom_value(float.id).is_unset());
    }

    #[tokio::test]
    async fn test_patch_writes_all_attributes_at_once() {
        let (server, seeded) = setup(false);
        let number = seeded.field("MyNumber").unwrap();
        let float = seeded.field("MyFloat").unwrap();
        let body = json!({
            float.attribute_key().to_string(): 1.5,
            number.attribute_key().to_string(): 42,
        });

        let (status, body) = send(&server, patch(seeded.work_package_id, body, "en")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lockVersion"], 2);

        let wp = server.database().get_work_package(seeded.work_package_id).unwrap().unwrap();
        assert_eq!(wp.custom_value(float.id), &FieldValue::Float(1.5));
        assert_eq!(wp.custom_value(number.id), &FieldValue::Integer(42));

        let (status, body) = send(&server, patch(seeded.work_package_id, json!({}), "en")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lockVersion"], 2);
    }

    #[tokio::test]
    async fn test_search_work_packages() {
        let (server, _) = setup(false);
        let dependency = server.database().create_work_package("Dependency").unwrap();
        server.database().create_work_package("Unrelated").unwrap();

        let (status, body) = send(&server, get("/api/v3/work_packages?q=depend")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["_embedded"]["elements"][0]["id"], dependency.0);
        assert_eq!(body["_embedded"]["elements"][0]["subject"], "Dependency");

        let (_, body) = send(&server, get(&format!("/api/v3/work_packages?q={}", dependency))).await;
        assert_eq!(body["_embedded"]["elements"][0]["id"], dependency.0);

        let (_, body) = send(&server, get("/api/v3/work_packages?q=%25")).await;
        assert_eq!(body["total"], 0);
        let (_, body) = send(&server, get("/api/v3/work_packages")).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_render_preview() {
        let (server, _) = setup(false);
        let dependency = server.database().create_work_package("Dependency").unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v3/render/markdown")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(format!("Blocked by ##{}\n\n<b>", dependency)))
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains(&format!("#{} Dependency</a>", dependency)));
        assert!(html.contains("<p>&lt;b&gt;</p>"));
    }

    #[tokio::test]
    async fn test_patch_list_link() {
        let (server, seeded) = setup(false);
        let letters = seeded.field("Letters").unwrap();
        let x = letters.option_by_value("X").unwrap();
        let key = letters.attribute_key().to_string();

        let body = json!({ "_links": { &key: { "href": x.href() } } });
        let (status, body) = send(&server, patch(seeded.work_package_id, body, "en")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["_links"][&key]["title"], "X");
    }

    #[tokio::test]
    async fn test_patch_bad_requests() {
        let (server, seeded) = setup(false);
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(format!("/api/v3/work_packages/{}", seeded.work_package_id))
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&server, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&server, patch(seeded.work_package_id, json!({ "customField999": 1 }), "en")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&server, patch(WorkPackageId(999), json!({}), "en")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_custom_field_and_option() {
        let (server, seeded) = setup(false);
        let letters = seeded.field("Letters").unwrap();
        let (status, body) = send(&server, get(&format!("/api/v3/custom_fields/{}", letters.id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fieldFormat"], "list");
        assert_eq!(body["possibleValues"].as_array().unwrap().len(), 3);

        let z = letters.option_by_value("Z").unwrap();
        let (status, body) = send(&server, get(&z.href())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], "Z");
        assert_eq!(body["position"], 3);
    }

    #[tokio::test]
    async fn test_fixture_route_requires_test_mode() {
        let fixture = || {
            Request::builder()
                .method(Method::POST)
                .uri("/api/test/fixtures")
                .body(Body::from(r#"{"custom_fields": [{"name": "Free", "format": "string"}]}"#))
                .unwrap()
        };

        let (server, _) = setup(false);
        let (status, _) = send(&server, fixture()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (server, _) = setup(true);
        let (status, body) = send(&server, fixture()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["fields"]["Free"]["id"].as_u64().is_some());
    }
}
