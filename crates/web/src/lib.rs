//! Inplace Web API
//!
//! Serves work packages and their custom values over `/api/v3`, accepts
//! attribute updates, and provides an HTTP client that plugs into inplace
//! fields as their update collaborator.

pub mod client;
pub mod config;
pub mod error;
pub mod representation;
pub mod server;

pub use client::HttpCollaborator;
pub use config::WebConfig;
pub use error::{WebError, WebResult};
pub use server::WebServer;
