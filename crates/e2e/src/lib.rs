//! Inplace E2E Scenario Framework
//!
//! Drives inplace fields through declarative YAML scenarios:
//! - Seeds custom fields and a work package through a backend
//! - Binds one inplace field per custom field on a work package page
//! - Executes user actions and assertions step by step
//! - Optionally spawns the `inplace-web` server and talks to it over HTTP
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Scenario Runner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── start_server() -> ServerHandle       (remote only)   │
//! │    ├── backend() -> LocalBackend | RemoteBackend            │
//! │    └── run_spec(spec: ScenarioSpec) -> ScenarioResult       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── name, description, tags, locale                      │
//! │    ├── fixture: custom fields + work package values         │
//! │    └── steps: [Step]                                        │
//! │          ├── activate / set_value / submit / update         │
//! │          ├── cancel_by_escape / cancel_by_click             │
//! │          └── expect_* assertions                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod page;
pub mod runner;
pub mod server;
pub mod spec;

pub use backend::{Backend, LocalBackend, RemoteBackend};
pub use error::{E2eError, E2eResult};
pub use page::{Notification, WorkPackagePage};
pub use runner::ScenarioRunner;
pub use spec::{NotificationType, ScenarioSpec, ScenarioStep};
