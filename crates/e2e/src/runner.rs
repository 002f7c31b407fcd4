//! Scenario runner: seeds a backend, binds a page and executes the steps

use inplace_common::{CountingCollaborator, EditState, Locale, UpdateCollaborator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::backend::{Backend, LocalBackend, RemoteBackend};
use crate::error::{E2eError, E2eResult};
use crate::page::WorkPackagePage;
use crate::server::{ServerConfig, ServerHandle};
use crate::spec::{ScenarioSpec, ScenarioStep};

/// Result of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn single(result: ScenarioResult) -> Self {
        let passed = usize::from(result.success);
        Self {
            total: 1,
            passed,
            failed: 1 - passed,
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    }
}

/// Main scenario runner
pub struct ScenarioRunner {
    /// Spawned server configuration; `None` runs in-process
    server_config: Option<ServerConfig>,

    /// Running server handle (if any)
    server: Option<ServerHandle>,

    /// Scenario directory
    specs_dir: PathBuf,

    /// Output directory for results
    output_dir: PathBuf,
}

impl ScenarioRunner {
    /// Create a runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            server_config: config.server,
            server: None,
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
        }
    }

    /// Start the server when running against one
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(()); // Already running
        }
        if let Some(config) = &self.server_config {
            self.server = Some(ServerHandle::spawn(config.clone()).await?);
        }
        Ok(())
    }

    /// Stop the server
    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Run all scenarios in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.specs_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<ScenarioResult> {
        let specs = ScenarioSpec::load_all(&self.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;

        self.start_server().await?;
        self.run_spec(&spec).await
    }

    /// Run a list of scenarios
    pub async fn run_specs(&mut self, specs: &[ScenarioSpec]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        self.start_server().await?;

        info!("Running {} scenario(s)...", specs.len());

        for spec in specs {
            match self.run_spec(spec).await {
                Ok(result) => {
                    if result.success {
                        passed += 1;
                        info!("✓ {} ({} ms)", result.name, result.duration_ms);
                    } else {
                        failed += 1;
                        error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
                    }
                    results.push(result);
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", spec.name, e);
                    results.push(ScenarioResult {
                        name: spec.name.clone(),
                        success: false,
                        duration_ms: 0,
                        steps: vec![],
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Scenario Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(SuiteResult {
            total: specs.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario, stopping at the first failing step
    pub async fn run_spec(&self, spec: &ScenarioSpec) -> E2eResult<ScenarioResult> {
        let start = Instant::now();
        debug!("Running scenario: {}", spec.name);

        let backend = self.backend()?;
        let locale = Locale::parse(&spec.locale)?;
        let seeded = backend.seed(&spec.fixture).await?;
        let fields: Vec<_> = seeded.fields.values().cloned().collect();
        let wp = backend.work_package(seeded.work_package_id, &fields).await?;

        let mut ctx = ScenarioContext {
            page: WorkPackagePage::new(&seeded, &wp, locale),
            collaborator: CountingCollaborator::new(backend.collaborator()),
            backend: backend.as_ref(),
            fields,
        };

        let mut steps = Vec::new();
        let mut scenario_error = None;
        for step in &spec.steps {
            let step_start = Instant::now();
            let outcome = ctx.execute(step).await;
            let error = outcome.err().map(|e| e.to_string());
            steps.push(StepResult {
                step: step.label(),
                success: error.is_none(),
                duration_ms: step_start.elapsed().as_millis() as u64,
                error: error.clone(),
            });
            if let Some(e) = error {
                scenario_error = Some(format!("{}: {}", step.label(), e));
                break;
            }
        }

        Ok(ScenarioResult {
            name: spec.name.clone(),
            success: scenario_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error: scenario_error,
        })
    }

    /// Fresh in-process backend per scenario, or the spawned server
    fn backend(&self) -> E2eResult<Box<dyn Backend>> {
        match &self.server {
            Some(server) => Ok(Box::new(RemoteBackend::new(server.base_url())?)),
            None if self.server_config.is_some() => Err(E2eError::ServerStartup(
                "server not started".to_string(),
            )),
            None => Ok(Box::new(LocalBackend::new()?)),
        }
    }

    /// Write results to JSON file
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("scenario-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    pub fn specs_dir(&self) -> &Path {
        &self.specs_dir
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScenarioRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub server: Option<ServerConfig>,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: None,
            specs_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/specs")),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

struct ScenarioContext<'a> {
    page: WorkPackagePage,
    collaborator: CountingCollaborator<Arc<dyn UpdateCollaborator>>,
    backend: &'a dyn Backend,
    fields: Vec<inplace_common::CustomFieldDefinition>,
}

impl ScenarioContext<'_> {
    async fn execute(&mut self, step: &ScenarioStep) -> E2eResult<()> {
        match step {
            ScenarioStep::Activate { field } => self.page.activate(field),
            ScenarioStep::SetValue { field, value } => self.page.set_value(field, value),
            ScenarioStep::Submit { field } => self.page.submit(field, &self.collaborator).await,
            ScenarioStep::SubmitByEnter { field } => {
                self.page.submit_by_enter(field, &self.collaborator).await
            }
            ScenarioStep::Update { field, value } => {
                self.page.activate(field)?;
                self.page.set_value(field, value)?;
                self.page.submit(field, &self.collaborator).await
            }
            ScenarioStep::CancelByEscape { field } => self.page.cancel_by_escape(field).map(|_| ()),
            ScenarioStep::CancelByClick { field } => self.page.cancel_by_click(field),
            ScenarioStep::ExpectActive { field } => {
                let state = self.page.field(field)?.state();
                check(
                    matches!(state, EditState::Active | EditState::ActiveWithError),
                    || format!("{} is {}, expected it in edit mode", field, state),
                )
            }
            ScenarioStep::ExpectInactive { field } => {
                let state = self.page.field(field)?.state();
                check(state == EditState::Inactive, || {
                    format!("{} is {}, expected inactive", field, state)
                })
            }
            ScenarioStep::ExpectInvalid { field, message } => {
                let f = self.page.field(field)?;
                check(f.state() == EditState::ActiveWithError, || {
                    format!("{} is {}, expected an inline error", field, f.state())
                })?;
                match (message, f.error()) {
                    (Some(expected), Some(actual)) => check(&actual.message == expected, || {
                        format!("{} shows '{}', expected '{}'", field, actual.message, expected)
                    }),
                    _ => Ok(()),
                }
            }
            ScenarioStep::ExpectStateText { field, text } => {
                let f = self.page.field(field)?;
                check(!f.is_active(), || format!("{} is still in edit mode", field))?;
                let actual = f.display_text();
                check(&actual == text, || {
                    format!("{} displays '{}', expected '{}'", field, actual, text)
                })
            }
            ScenarioStep::ExpectValue { field, value, option } => {
                let f = self.page.field(field)?;
                let expected = match (value, option) {
                    (_, Some(label)) => f
                        .binding()
                        .definition
                        .option_by_value(label)
                        .map(|o| o.href())
                        .ok_or_else(|| {
                            E2eError::AssertionFailed(format!("{} has no option '{}'", field, label))
                        })?,
                    (Some(value), None) => value.clone(),
                    (None, None) => String::new(),
                };
                let actual = f.editor_value().ok_or_else(|| {
                    E2eError::AssertionFailed(format!("{} is not in edit mode", field))
                })?;
                check(actual == expected, || {
                    format!("{} editor holds '{}', expected '{}'", field, actual, expected)
                })
            }
            ScenarioStep::ExpectAttributes { values } => {
                for (key, expected) in values {
                    let actual = self.page.field_by_attribute(key)?.display_text();
                    check(&actual == expected, || {
                        format!("{} displays '{}', expected '{}'", key, actual, expected)
                    })?;
                }
                Ok(())
            }
            ScenarioStep::ExpectBinding {
                field,
                format,
                editor,
                required,
            } => {
                let binding = self.page.field(field)?.binding();
                let def = &binding.definition;
                if let Some(format) = format {
                    check(def.format == *format, || {
                        format!("{} has format {}, expected {}", field, def.format, format)
                    })?;
                }
                if let Some(editor) = editor {
                    check(binding.editor_kind() == *editor, || {
                        format!("{} uses {:?}, expected {:?}", field, binding.editor_kind(), editor)
                    })?;
                }
                if let Some(required) = required {
                    check(def.is_required == *required, || {
                        format!("{} required is {}, expected {}", field, def.is_required, required)
                    })?;
                }
                Ok(())
            }
            ScenarioStep::TogglePreview { field } => {
                self.page.toggle_preview(field, self.backend).await.map(|_| ())
            }
            ScenarioStep::ExpectPreview { field, contains } => {
                let html = self.page.preview(field)?.ok_or_else(|| {
                    E2eError::AssertionFailed(format!("{} shows no preview", field))
                })?;
                for fragment in contains {
                    check(html.contains(fragment.as_str()), || {
                        format!("{} preview lacks '{}': {}", field, fragment, html)
                    })?;
                }
                Ok(())
            }
            ScenarioStep::ExpectNoPreview { field } => {
                let previewing = self.page.preview(field)?.is_some();
                check(!previewing, || format!("{} still shows the preview", field))
            }
            ScenarioStep::ExpectAutocomplete { field, suggestions } => {
                let actual: Vec<String> = self
                    .page
                    .autocomplete(field, self.backend)
                    .await?
                    .into_iter()
                    .map(|s| s.subject)
                    .collect();
                check(&actual == suggestions, || {
                    format!("{} suggests {:?}, expected {:?}", field, actual, suggestions)
                })
            }
            ScenarioStep::SelectAutocomplete { field, subject } => {
                self.page.select_autocomplete(field, subject, self.backend).await
            }
            ScenarioStep::ExpectNotification { kind, message } => {
                let notice = self.page.notification().ok_or_else(|| {
                    E2eError::AssertionFailed("no notification is shown".to_string())
                })?;
                check(notice.kind == *kind, || {
                    format!("notification is {:?} ('{}'), expected {:?}", notice.kind, notice.message, kind)
                })?;
                match message {
                    Some(expected) => check(&notice.message == expected, || {
                        format!("notification says '{}', expected '{}'", notice.message, expected)
                    }),
                    None => Ok(()),
                }
            }
            ScenarioStep::DismissNotification => {
                self.page.dismiss_notification();
                Ok(())
            }
            ScenarioStep::ExpectUpdateCalls { count } => {
                let actual = self.collaborator.call_count();
                check(actual == *count, || {
                    format!("{} update call(s), expected {}", actual, count)
                })
            }
            ScenarioStep::ExpectPersisted { field, value } => {
                let def = self.page.field(field)?.binding().definition.clone();
                let expected = match value {
                    Some(v) => v.to_field_value(&def)?,
                    None => Default::default(),
                };
                let wp = self
                    .backend
                    .work_package(self.page.work_package_id(), &self.fields)
                    .await?;
                let actual = wp.custom_value(def.id);
                check(actual == &expected, || {
                    format!("{} stores {:?}, expected {:?}", field, actual, expected)
                })
            }
            ScenarioStep::Log { message } => {
                info!("[scenario] {}", message);
                Ok(())
            }
        }
    }
}

fn check(condition: bool, describe: impl FnOnce() -> String) -> E2eResult<()> {
    if condition {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name: required-integer
fixture:
  custom_fields:
    - name: MyNumber
      format: int
      is_required: true
steps:
  - action: update
    field: MyNumber
    value: ""
  - action: expect_invalid
    field: MyNumber
    message: MyNumber can't be blank.
  - action: expect_update_calls
    count: 0
  - action: set_value
    field: MyNumber
    value: "42"
  - action: submit
    field: MyNumber
  - action: expect_state_text
    field: MyNumber
    text: "42"
  - action: expect_update_calls
    count: 1
  - action: expect_persisted
    field: MyNumber
    value: 42
"#;

    #[tokio::test]
    async fn test_run_spec_in_process() {
        let runner = ScenarioRunner::new();
        let spec = ScenarioSpec::from_yaml(SCENARIO).unwrap();
        let result = runner.run_spec(&spec).await.unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.steps.len(), 8);
    }

    #[tokio::test]
    async fn test_run_spec_stops_at_first_failure() {
        let runner = ScenarioRunner::new();
        let mut spec = ScenarioSpec::from_yaml(SCENARIO).unwrap();
        spec.steps.insert(
            0,
            ScenarioStep::ExpectActive {
                field: "MyNumber".to_string(),
            },
        );
        let result = runner.run_spec(&spec).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert!(result.error.unwrap().starts_with("expect_active MyNumber"));
    }

    #[tokio::test]
    async fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScenarioRunner::with_config(RunnerConfig {
            output_dir: dir.path().join("out"),
            ..RunnerConfig::default()
        });
        let result = runner
            .run_spec(&ScenarioSpec::from_yaml(SCENARIO).unwrap())
            .await
            .unwrap();
        let path = runner.write_results(&SuiteResult::single(result)).unwrap();
        let written: SuiteResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.passed, 1);
    }
}
