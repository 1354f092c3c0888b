//! # HMS Core
//!
//! Core business logic for the hospital management system.
//!
//! This crate owns the SQLite schema and every clinical, financial and reference-data workflow:
//! - Emergency registration, triage, disposition and the board
//! - Bed assignment, occupancy and reconciliation against active admissions
//! - Appointments with their lab orders and prescriptions
//! - Billing accounts, discounts, payments and the revenue dashboard
//! - The database-backed cache, runtime settings, seeding and background jobs
//!
//! **No API concerns**: HTTP routing, authentication middleware and the CLI belong in
//! `api-rest` and `hms-cli`.

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod seed;

#[cfg(test)]
mod test_support;

pub use cache::CacheService;
pub use config::{CoreConfig, EnvValues};
pub use db::Database;
pub use error::{HmsError, HmsResult};
pub use models::{User, UserRole};
pub use repositories::appointments::{AppointmentFilter, AppointmentService};
pub use repositories::beds::BedService;
pub use repositories::billing::{BillingService, DashboardFilter};
pub use repositories::emergency::EmergencyService;
pub use repositories::encounters::EncounterService;
pub use repositories::lab_orders::LabOrderService;
pub use repositories::master_data::MasterDataService;
pub use repositories::patients::PatientService;
pub use repositories::pharmacy::PharmacyService;
pub use repositories::settings::SettingsRepository;
pub use repositories::users::UserService;
