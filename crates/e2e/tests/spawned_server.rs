//! Scenarios against a spawned `inplace-web` process
//!
//! Uses `INPLACE_E2E_SERVER_BINARY` when set, else the `inplace-web` built
//! next to this test in the target directory. Skipped when neither exists.

use std::path::PathBuf;

use inplace_e2e::runner::RunnerConfig;
use inplace_e2e::server::{ServerConfig, ServerHandle};
use inplace_e2e::{Backend, RemoteBackend, ScenarioRunner};

fn server_binary() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("INPLACE_E2E_SERVER_BINARY") {
        return Some(PathBuf::from(path));
    }
    // target/<profile>/deps/<this test> -> target/<profile>/inplace-web
    let profile_dir = std::env::current_exe().ok()?.parent()?.parent()?.to_path_buf();
    let path = profile_dir.join(format!("inplace-web{}", std::env::consts::EXE_SUFFIX));
    path.exists().then_some(path)
}

fn server_config() -> Option<ServerConfig> {
    let Some(binary_path) = server_binary() else {
        eprintln!("inplace-web binary not built; skipping spawned server test");
        return None;
    };
    Some(ServerConfig {
        binary_path,
        ..ServerConfig::default()
    })
}

#[tokio::test]
async fn spawned_server_is_healthy_until_stopped() {
    let Some(config) = server_config() else { return };
    let mut server = ServerHandle::spawn(config).await.unwrap();
    let health_url = format!("{}/health", server.base_url());

    let body: serde_json::Value = reqwest::get(&health_url)
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "inplace-web");

    // Test mode is on, so fixtures can be seeded
    let backend = RemoteBackend::new(server.base_url()).unwrap();
    let fixture = serde_json::from_str(r#"{"related_work_packages": ["Dependency"]}"#).unwrap();
    let seeded = backend.seed(&fixture).await.unwrap();
    let found = backend.search_work_packages("Dependency").await.unwrap();
    assert_eq!(found[0].id, seeded.related["Dependency"]);

    server.stop().unwrap();
    assert!(reqwest::get(&health_url).await.is_err());
}

#[tokio::test]
async fn runner_drives_spawned_server() {
    let Some(config) = server_config() else { return };
    let output = tempfile::tempdir().unwrap();
    let mut runner = ScenarioRunner::with_config(RunnerConfig {
        server: Some(config),
        output_dir: output.path().to_path_buf(),
        ..RunnerConfig::default()
    });

    let result = runner.run_test("float-en").await.unwrap();
    assert!(result.success, "{:?}", result.error);
    assert!(!result.steps.is_empty());

    let path = runner
        .write_results(&inplace_e2e::runner::SuiteResult::single(result))
        .unwrap();
    assert!(path.exists());

    runner.stop_server().unwrap();
}
