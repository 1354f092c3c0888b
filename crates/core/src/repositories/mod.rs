//! Relational data access and the workflows built on it.
//!
//! Each module exposes free functions over `&rusqlite::Connection` (usable inside a transaction)
//! and a service that owns a [`crate::Database`] handle.

pub mod appointments;
pub mod beds;
pub mod billing;
pub mod emergency;
pub mod encounters;
pub mod lab_orders;
pub mod master_data;
pub mod patients;
pub mod pharmacy;
pub mod reports;
pub mod settings;
pub mod users;
