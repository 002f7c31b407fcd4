//! Inplace Common Library
//!
//! Custom field definitions, locale-aware number handling, value validation,
//! the inplace field state machine, work package references in formatted
//! text and the persistence behind it.

pub mod collaborator;
pub mod db;
pub mod error;
pub mod fixtures;
pub mod i18n;
pub mod inplace;
pub mod locale;
pub mod references;
pub mod service;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use collaborator::{CountingCollaborator, SuccessNotification, UpdateCollaborator, UpdateRequest};
pub use db::Database;
pub use error::{Error, Result};
pub use fixtures::{FixtureSpec, FixtureValue, SeededFixture};
pub use inplace::{EditError, EditState, FieldBinding, InplaceField};
pub use locale::Locale;
pub use references::{ReferenceQuery, ReferenceStyle};
pub use service::UpdateService;
pub use types::*;
pub use validation::{ValidationError, ValidationErrorKind};

/// Inplace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".inplace")
}

/// Default database path
pub fn default_db_path() -> std::path::PathBuf {
    default_store_path().join("state.db")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
