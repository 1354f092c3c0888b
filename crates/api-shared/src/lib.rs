//! # API Shared
//!
//! Shared utilities and definitions for the HMS APIs.
//!
//! Contains:
//! - Request/response payloads (`dto` module)
//! - Shared services like `HealthService`
//! - API token helpers used by the REST auth layer and the CLI
//!
//! Used by `hms-core`, `api-rest` and `hms-cli` for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use dto::*;
pub use health::HealthService;
