//! Constants used throughout the HMS core crate.
//!
//! Cache keys, defaults and storage formats live here so the REST API, the CLI and the jobs
//! agree on them.

/// Default SQLite database path when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "hms.sqlite3";

/// Default REST listen address.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Default cache TTL for dashboard aggregates and master data, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;

/// Default stock reservation window for non-instant prescriptions, in minutes.
pub const DEFAULT_RESERVATION_MINUTES: u64 = 60;

/// Default interval between background job sweeps, in seconds.
pub const DEFAULT_JOB_INTERVAL_SECS: u64 = 60;

/// Default branch name created on first start.
pub const DEFAULT_BRANCH_NAME: &str = "Main";

/// Storage format for every timestamp column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for date-only columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cache key prefix for master-data lookups.
pub const MASTER_CACHE_PREFIX: &str = "master:";

pub const CACHE_KEY_DEPARTMENTS: &str = "master:departments";
pub const CACHE_KEY_WARDS: &str = "master:wards";
pub const CACHE_KEY_LAB_TESTS: &str = "master:lab_tests";
pub const CACHE_KEY_DRUGS: &str = "master:drugs";

/// Cache key for the bed occupancy dashboard aggregate.
pub const CACHE_KEY_BED_OCCUPANCY: &str = "dashboard:bed_occupancy";

/// Cache key for per-department activity counts.
pub const CACHE_KEY_DEPARTMENT_STATS: &str = "dashboard:department_stats";

/// Settings key for triage category presentation settings.
pub const SETTINGS_KEY_TRIAGE_CATEGORIES: &str = "triage.categories";

/// Number of approvers shown on the discount leaderboard.
pub const APPROVER_LEADERBOARD_SIZE: i64 = 10;
