//! YAML seed files for reference data, staff accounts and report schedules.
//!
//! Seeding is idempotent: records already present (matched by code, name or email) are left
//! alone. The whole file is applied in one transaction.
//!
//! ```yaml
//! branches: [Main, Annex]
//! departments:
//!   - name: Internal Medicine
//!     code: MED
//!     wards:
//!       - name: Ward A
//!         beds: [A1, A2]
//! lab_tests:
//!   - { name: Full Blood Count, code: FBC, price_cents: 1500 }
//! drugs:
//!   - { name: Paracetamol, strength: 500mg, unit_price_cents: 20, stock_quantity: 1000 }
//! users:
//!   - { name: Admin, email: admin@example.org, role: admin }
//! report_schedules:
//!   - { report_type: daily_revenue, frequency: daily, next_run_at: "2024-01-01 06:00:00" }
//! ```

use crate::db::{parse_datetime, Database};
use crate::models::{ReportFrequency, UserRole};
use crate::repositories::master_data::{
    ensure_branch, insert_bed, insert_department, insert_drug, insert_lab_test, insert_ward,
    NewDrug,
};
use crate::repositories::reports::insert_schedule;
use crate::repositories::users::{find_by_email, insert_user};
use crate::{HmsError, HmsResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedFile {
    pub branches: Vec<String>,
    pub departments: Vec<SeedDepartment>,
    pub lab_tests: Vec<SeedLabTest>,
    pub drugs: Vec<SeedDrug>,
    pub users: Vec<SeedUser>,
    pub report_schedules: Vec<SeedReportSchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedDepartment {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub wards: Vec<SeedWard>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedWard {
    pub name: String,
    #[serde(default)]
    pub beds: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedLabTest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub price_cents: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedDrug {
    pub name: String,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub unit_price_cents: i64,
    #[serde(default)]
    pub stock_quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedReportSchedule {
    pub report_type: String,
    pub frequency: ReportFrequency,
    #[serde(default)]
    pub branch: Option<String>,
    pub next_run_at: String,
}

/// Counts of records created by a seed run, plus tokens for new users.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub branches: usize,
    pub departments: usize,
    pub wards: usize,
    pub beds: usize,
    pub lab_tests: usize,
    pub drugs: usize,
    pub report_schedules: usize,
    /// `(email, api_token)` for each user created by this run.
    pub user_tokens: Vec<(String, String)>,
}

/// Parses seed YAML, reporting the path of the offending field on failure.
pub fn parse_seed(yaml_text: &str) -> HmsResult<SeedFile> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        HmsError::YamlDeserialization {
            path,
            source: err.into_inner(),
        }
    })
}

pub fn load_seed(path: &Path) -> HmsResult<SeedFile> {
    let text = std::fs::read_to_string(path).map_err(HmsError::FileRead)?;
    parse_seed(&text)
}

fn lookup_id(conn: &Connection, sql: &str, key: &str) -> HmsResult<Option<i64>> {
    conn.query_row(sql, params![key], |row| row.get(0))
        .optional()
        .map_err(HmsError::from)
}

fn branch_exists(conn: &Connection, name: &str) -> HmsResult<bool> {
    Ok(lookup_id(conn, "SELECT id FROM branches WHERE name = ?1", name)?.is_some())
}

fn apply(conn: &Connection, seed: &SeedFile) -> HmsResult<SeedSummary> {
    let mut summary = SeedSummary::default();

    for name in &seed.branches {
        if !branch_exists(conn, name)? {
            ensure_branch(conn, name)?;
            summary.branches += 1;
        }
    }

    for dept in &seed.departments {
        let department_id =
            match lookup_id(conn, "SELECT id FROM departments WHERE code = ?1", &dept.code)? {
                Some(id) => id,
                None => {
                    summary.departments += 1;
                    insert_department(conn, &dept.name, &dept.code)?
                }
            };
        for ward in &dept.wards {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM wards WHERE name = ?1 AND department_id = ?2",
                    params![ward.name, department_id],
                    |row| row.get(0),
                )
                .optional()?;
            let ward_id = match existing {
                Some(id) => id,
                None => {
                    summary.wards += 1;
                    insert_ward(conn, &ward.name, Some(department_id))?
                }
            };
            for bed in &ward.beds {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM beds WHERE ward_id = ?1 AND bed_number = ?2",
                        params![ward_id, bed],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    insert_bed(conn, ward_id, bed)?;
                    summary.beds += 1;
                }
            }
        }
    }

    for test in &seed.lab_tests {
        if lookup_id(conn, "SELECT id FROM lab_tests WHERE code = ?1", &test.code)?.is_none() {
            insert_lab_test(conn, &test.name, &test.code, test.price_cents)?;
            summary.lab_tests += 1;
        }
    }

    for drug in &seed.drugs {
        if lookup_id(conn, "SELECT id FROM drugs WHERE name = ?1", &drug.name)?.is_none() {
            insert_drug(
                conn,
                &NewDrug {
                    name: &drug.name,
                    form: drug.form.as_deref(),
                    strength: drug.strength.as_deref(),
                    unit_price_cents: drug.unit_price_cents,
                    stock_quantity: drug.stock_quantity,
                },
            )?;
            summary.drugs += 1;
        }
    }

    for user in &seed.users {
        if find_by_email(conn, user.email.trim())?.is_none() {
            let (created, token) = insert_user(conn, &user.name, &user.email, user.role)?;
            summary.user_tokens.push((created.email, token));
        }
    }

    for schedule in &seed.report_schedules {
        let next_run_at = parse_datetime(&schedule.next_run_at)
            .map_err(|_| HmsError::validation("next_run_at", "expected YYYY-MM-DD HH:MM:SS"))?;
        let branch_id = match &schedule.branch {
            Some(name) => Some(ensure_branch(conn, name)?),
            None => None,
        };
        insert_schedule(conn, &schedule.report_type, schedule.frequency, branch_id, next_run_at)?;
        summary.report_schedules += 1;
    }

    Ok(summary)
}

/// Applies a parsed seed file atomically.
pub fn apply_seed(db: &Database, seed: &SeedFile) -> HmsResult<SeedSummary> {
    let summary = db.with_transaction(|tx| apply(tx, seed))?;
    tracing::info!(
        departments = summary.departments,
        wards = summary.wards,
        beds = summary.beds,
        lab_tests = summary.lab_tests,
        drugs = summary.drugs,
        users = summary.user_tokens.len(),
        report_schedules = summary.report_schedules,
        "seed applied"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: &str = r#"
branches: [Main]
departments:
  - name: Internal Medicine
    code: MED
    wards:
      - name: Ward A
        beds: [A1, A2]
lab_tests:
  - { name: Full Blood Count, code: FBC, price_cents: 1500 }
drugs:
  - { name: Paracetamol, strength: 500mg, unit_price_cents: 20, stock_quantity: 1000 }
users:
  - { name: Admin, email: admin@example.org, role: admin }
"#;

    #[test]
    fn seed_applies_once() {
        let db = Database::open_in_memory().unwrap();
        let seed = parse_seed(SEED).unwrap();
        let first = apply_seed(&db, &seed).unwrap();
        assert_eq!(first.departments, 1);
        assert_eq!(first.beds, 2);
        assert_eq!(first.user_tokens.len(), 1);
        assert!(first.user_tokens[0].1.starts_with("hms_"));

        let second = apply_seed(&db, &seed).unwrap();
        assert_eq!(second, SeedSummary::default());
    }

    #[test]
    fn unknown_fields_report_their_path() {
        let err = parse_seed("departments:\n  - name: X\n    code: X\n    colour: red\n").unwrap_err();
        match err {
            HmsError::YamlDeserialization { path, .. } => assert!(path.starts_with("departments[0]")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_role_is_rejected() {
        let err = parse_seed("users:\n  - { name: A, email: a@b.c, role: wizard }\n").unwrap_err();
        assert!(matches!(err, HmsError::YamlDeserialization { .. }));
    }

    #[test]
    fn bad_schedule_rolls_back_everything() {
        let db = Database::open_in_memory().unwrap();
        let seed = parse_seed(
            "branches: [North]\nreport_schedules:\n  - { report_type: daily_revenue, frequency: daily, next_run_at: soon }\n",
        )
        .unwrap();
        let err = apply_seed(&db, &seed).unwrap_err();
        assert_eq!(err.field(), Some("next_run_at"));
        let branches: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM branches", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(branches, 0);
    }

    #[test]
    fn load_seed_reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();
        let seed = load_seed(file.path()).unwrap();
        assert_eq!(seed.lab_tests.len(), 1);
        assert!(matches!(
            load_seed(Path::new("/definitely/missing.yaml")),
            Err(HmsError::FileRead(_))
        ));
    }
}
