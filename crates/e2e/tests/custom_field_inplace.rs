//! Inplace editing of custom fields, in-process and over HTTP

use inplace_common::{
    CountingCollaborator, Database, EditState, FieldValue, FixtureSpec, Locale, UpdateCollaborator,
    ValidationErrorKind,
};
use inplace_e2e::runner::RunnerConfig;
use inplace_e2e::{Backend, NotificationType, RemoteBackend, ScenarioRunner, WorkPackagePage};
use inplace_web::{WebConfig, WebServer};
use test_case::test_case;

async fn spawn_server() -> RemoteBackend {
    let cfg = WebConfig {
        test_mode: true,
        ..WebConfig::default()
    };
    let server = WebServer::with_database(cfg, Database::open_memory().unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve_on(listener));
    RemoteBackend::new(format!("http://{}", addr)).unwrap()
}

fn float_fixture() -> FixtureSpec {
    serde_json::from_str(
        r#"{"custom_fields": [{"name": "MyFloat", "format": "float"}],
            "work_package": {"custom_values": {"MyFloat": 123.5}}}"#,
    )
    .unwrap()
}

#[tokio::test]
async fn bundled_scenarios_pass_in_process() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        output_dir: dir.path().to_path_buf(),
        ..RunnerConfig::default()
    });
    let results = runner.run_all().await.unwrap();

    let failures: Vec<_> = results
        .results
        .iter()
        .filter(|r| !r.success)
        .map(|r| format!("{}: {}", r.name, r.error.as_deref().unwrap_or_default()))
        .collect();
    assert!(failures.is_empty(), "{:#?}", failures);
    assert_eq!(results.total, 9);
}

#[tokio::test]
async fn run_tagged_selects_scenarios() {
    let mut runner = ScenarioRunner::new();
    let results = runner.run_tagged("float").await.unwrap();
    assert_eq!(results.total, 2);
    assert_eq!(results.failed, 0);
}

#[test_case("en", "10000.55", "10,000.55", "Successful update." ; "english")]
#[test_case("de", "10000,55", "10.000,55", "Erfolgreich aktualisiert." ; "german")]
#[tokio::test]
async fn float_update_over_http(locale: &str, input: &str, shown: &str, notice: &str) {
    let backend = spawn_server().await;
    let seeded = backend.seed(&float_fixture()).await.unwrap();
    let fields: Vec<_> = seeded.fields.values().cloned().collect();
    let wp = backend
        .work_package(seeded.work_package_id, &fields)
        .await
        .unwrap();
    let mut page = WorkPackagePage::new(&seeded, &wp, Locale::parse(locale).unwrap());
    let collaborator = CountingCollaborator::new(backend.collaborator());

    page.activate("MyFloat").unwrap();
    page.set_value("MyFloat", input).unwrap();
    page.submit("MyFloat", &collaborator).await.unwrap();

    let field = page.field("MyFloat").unwrap();
    assert_eq!(field.state(), EditState::Inactive);
    assert_eq!(field.display_text(), shown);
    let notification = page.notification().unwrap();
    assert_eq!(notification.kind, NotificationType::Success);
    assert_eq!(notification.message, notice);
    assert_eq!(collaborator.call_count(), 1);

    let stored = backend
        .work_package(seeded.work_package_id, &fields)
        .await
        .unwrap();
    let def = seeded.field("MyFloat").unwrap();
    assert_eq!(stored.custom_value(def.id), &FieldValue::Float(10000.55));
}

#[tokio::test]
async fn server_length_error_keeps_editing() {
    let backend = spawn_server().await;
    let fixture: FixtureSpec = serde_json::from_str(
        r#"{"custom_fields": [{"name": "MyNumber", "format": "int", "min_length": 2, "max_length": 5}]}"#,
    )
    .unwrap();
    let seeded = backend.seed(&fixture).await.unwrap();
    let fields: Vec<_> = seeded.fields.values().cloned().collect();
    let wp = backend
        .work_package(seeded.work_package_id, &fields)
        .await
        .unwrap();
    let mut page = WorkPackagePage::new(&seeded, &wp, Locale::english());
    let collaborator = CountingCollaborator::new(backend.collaborator());

    page.activate("MyNumber").unwrap();
    page.set_value("MyNumber", "123456").unwrap();
    page.submit("MyNumber", &collaborator).await.unwrap();
    assert_eq!(collaborator.call_count(), 1);
    assert_eq!(page.notification().unwrap().kind, NotificationType::Error);

    let field = page.field("MyNumber").unwrap();
    assert_eq!(field.state(), EditState::ActiveWithError);
    let error = field.error().unwrap();
    assert_eq!(error.kind, ValidationErrorKind::TooLong);
    assert_eq!(error.message, "MyNumber is too long (maximum is 5 characters).");
    assert_eq!(field.editor_value(), Some("123456"));

    page.cancel_by_click("MyNumber").unwrap();
    assert_eq!(page.field("MyNumber").unwrap().display_text(), "-");

    let fields: Vec<_> = seeded.fields.values().cloned().collect();
    let stored = backend
        .work_package(seeded.work_package_id, &fields)
        .await
        .unwrap();
    assert_eq!(
        stored.custom_value(seeded.field("MyNumber").unwrap().id),
        &FieldValue::Unset
    );
}

#[tokio::test]
async fn blank_required_value_keeps_editing_without_a_request() {
    let backend = spawn_server().await;
    let fixture: FixtureSpec = serde_json::from_str(
        r#"{"custom_fields": [{"name": "MyNumber", "format": "int", "is_required": true}]}"#,
    )
    .unwrap();
    let seeded = backend.seed(&fixture).await.unwrap();
    let wp = backend.work_package(seeded.work_package_id, &[]).await.unwrap();
    let mut page = WorkPackagePage::new(&seeded, &wp, Locale::english());
    let collaborator = CountingCollaborator::new(backend.collaborator());

    page.activate("MyNumber").unwrap();
    page.set_value("MyNumber", "").unwrap();
    page.submit("MyNumber", &collaborator).await.unwrap();
    assert_eq!(collaborator.call_count(), 0);

    let field = page.field("MyNumber").unwrap();
    assert_eq!(field.state(), EditState::ActiveWithError);
    assert_eq!(field.error().unwrap().kind, ValidationErrorKind::Required);
    assert_eq!(field.error().unwrap().message, "MyNumber can't be blank.");
}

#[tokio::test]
async fn page_refresh_shows_changes_from_elsewhere() {
    let backend = spawn_server().await;
    let seeded = backend.seed(&float_fixture()).await.unwrap();
    let fields: Vec<_> = seeded.fields.values().cloned().collect();
    let def = seeded.field("MyFloat").unwrap();
    let wp = backend
        .work_package(seeded.work_package_id, &fields)
        .await
        .unwrap();
    let mut page = WorkPackagePage::new(&seeded, &wp, Locale::parse("de").unwrap());

    backend
        .collaborator()
        .update(inplace_common::UpdateRequest {
            work_package_id: seeded.work_package_id,
            attribute: def.attribute_key(),
            value: FieldValue::Float(0.25),
            locale: Locale::english(),
        })
        .await
        .unwrap();

    let wp = backend
        .work_package(seeded.work_package_id, &fields)
        .await
        .unwrap();
    page.refresh(&wp).unwrap();
    assert_eq!(page.field("MyFloat").unwrap().display_text(), "0,25");
}
