//! Reference data: branches, departments, wards, beds, lab tests and drugs.
//!
//! Option lookups return only active (or non-discontinued) records ordered by name, and are
//! served through the [`CacheService`] under the `master:*` keys.

use crate::cache::CacheService;
use crate::constants::{
    CACHE_KEY_BED_OCCUPANCY, CACHE_KEY_DEPARTMENTS, CACHE_KEY_DEPARTMENT_STATS, CACHE_KEY_DRUGS,
    CACHE_KEY_LAB_TESTS, CACHE_KEY_WARDS, DATE_FORMAT,
};
use crate::db::{now, Database};
use crate::repositories::beds::occupancy_summary;
use crate::repositories::encounters::department_stats;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert_branch(conn: &Connection, name: &str) -> HmsResult<i64> {
    conn.execute("INSERT INTO branches (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

/// Returns the id of the branch called `name`, creating it if needed.
pub fn ensure_branch(conn: &Connection, name: &str) -> HmsResult<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM branches WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => Ok(id),
        None => insert_branch(conn, name),
    }
}

pub fn insert_department(conn: &Connection, name: &str, code: &str) -> HmsResult<i64> {
    conn.execute(
        "INSERT INTO departments (name, code) VALUES (?1, ?2)",
        params![name, code],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_ward(conn: &Connection, name: &str, department_id: Option<i64>) -> HmsResult<i64> {
    conn.execute(
        "INSERT INTO wards (name, department_id) VALUES (?1, ?2)",
        params![name, department_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_bed(conn: &Connection, ward_id: i64, bed_number: &str) -> HmsResult<i64> {
    conn.execute(
        "INSERT INTO beds (ward_id, bed_number) VALUES (?1, ?2)",
        params![ward_id, bed_number],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_lab_test(
    conn: &Connection,
    name: &str,
    code: &str,
    price_cents: i64,
) -> HmsResult<i64> {
    conn.execute(
        "INSERT INTO lab_tests (name, code, price_cents) VALUES (?1, ?2, ?3)",
        params![name, code, price_cents],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Values for a new catalogue drug.
#[derive(Debug, Clone, Default)]
pub struct NewDrug<'a> {
    pub name: &'a str,
    pub form: Option<&'a str>,
    pub strength: Option<&'a str>,
    pub unit_price_cents: i64,
    pub stock_quantity: i64,
}

pub fn insert_drug(conn: &Connection, drug: &NewDrug<'_>) -> HmsResult<i64> {
    if drug.stock_quantity < 0 {
        return Err(HmsError::validation(
            "stock_quantity",
            "cannot be negative",
        ));
    }
    conn.execute(
        "INSERT INTO drugs (name, form, strength, unit_price_cents, stock_quantity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            drug.name,
            drug.form,
            drug.strength,
            drug.unit_price_cents,
            drug.stock_quantity
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Flags a record inactive; used by admin maintenance and tests.
pub fn set_active(conn: &Connection, table: MasterTable, id: i64, active: bool) -> HmsResult<()> {
    let sql = match table {
        MasterTable::Departments => "UPDATE departments SET active = ?1 WHERE id = ?2",
        MasterTable::Wards => "UPDATE wards SET active = ?1 WHERE id = ?2",
        MasterTable::LabTests => "UPDATE lab_tests SET active = ?1 WHERE id = ?2",
        MasterTable::Drugs => "UPDATE drugs SET discontinued = NOT ?1 WHERE id = ?2",
    };
    let affected = conn.execute(sql, params![active, id])?;
    if affected == 0 {
        return Err(HmsError::not_found(table.entity(), id));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterTable {
    Departments,
    Wards,
    LabTests,
    Drugs,
}

impl MasterTable {
    fn entity(&self) -> &'static str {
        match self {
            Self::Departments => "department",
            Self::Wards => "ward",
            Self::LabTests => "lab test",
            Self::Drugs => "drug",
        }
    }
}

pub fn department_options(conn: &Connection) -> HmsResult<Vec<dto::DepartmentOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, code FROM departments WHERE active = 1 ORDER BY name COLLATE NOCASE, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(dto::DepartmentOption {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
}

pub fn ward_options(conn: &Connection) -> HmsResult<Vec<dto::WardOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, department_id FROM wards WHERE active = 1 ORDER BY name COLLATE NOCASE, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(dto::WardOption {
            id: row.get(0)?,
            name: row.get(1)?,
            department_id: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
}

pub fn lab_test_options(conn: &Connection) -> HmsResult<Vec<dto::LabTestOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, code, price_cents FROM lab_tests
         WHERE active = 1 ORDER BY name COLLATE NOCASE, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(dto::LabTestOption {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            price_cents: row.get(3)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
}

pub fn drug_options(conn: &Connection) -> HmsResult<Vec<dto::DrugOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, form, strength, unit_price_cents, stock_quantity - reserved_quantity
         FROM drugs WHERE discontinued = 0 ORDER BY name COLLATE NOCASE, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(dto::DrugOption {
            id: row.get(0)?,
            name: row.get(1)?,
            form: row.get(2)?,
            strength: row.get(3)?,
            unit_price_cents: row.get(4)?,
            available_quantity: row.get(5)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
}

pub fn department_exists(conn: &Connection, id: i64) -> HmsResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM departments WHERE id = ?1 AND active = 1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Returns the lab test name if the test exists and is orderable.
pub fn active_lab_test_name(conn: &Connection, id: i64) -> HmsResult<Option<String>> {
    conn.query_row(
        "SELECT name FROM lab_tests WHERE id = ?1 AND active = 1",
        params![id],
        |row| row.get(0),
    )
    .optional()
    .map_err(HmsError::from)
}

/// Cached master-data lookups.
#[derive(Clone, Debug)]
pub struct MasterDataService {
    db: Database,
    cache: CacheService,
}

impl MasterDataService {
    pub fn new(db: Database, cache: CacheService) -> Self {
        Self { db, cache }
    }

    pub fn departments(&self) -> HmsResult<Vec<dto::DepartmentOption>> {
        self.cache
            .remember(CACHE_KEY_DEPARTMENTS, |conn| department_options(conn))
    }

    pub fn wards(&self) -> HmsResult<Vec<dto::WardOption>> {
        self.cache.remember(CACHE_KEY_WARDS, |conn| ward_options(conn))
    }

    pub fn lab_tests(&self) -> HmsResult<Vec<dto::LabTestOption>> {
        self.cache
            .remember(CACHE_KEY_LAB_TESTS, |conn| lab_test_options(conn))
    }

    pub fn drugs(&self) -> HmsResult<Vec<dto::DrugOption>> {
        self.cache.remember(CACHE_KEY_DRUGS, |conn| drug_options(conn))
    }

    /// Active encounters and today's appointments per department, cached with the dashboards.
    pub fn department_stats(&self) -> HmsResult<dto::DepartmentStatsRes> {
        let today = now().date().format(DATE_FORMAT).to_string();
        self.cache
            .remember(CACHE_KEY_DEPARTMENT_STATS, |conn| department_stats(conn, &today))
    }

    /// Recompute and store every master-data key plus the dashboard aggregates.
    ///
    /// Returns the keys that were written.
    pub fn warm(&self) -> HmsResult<Vec<String>> {
        let departments = self.db.with_conn(department_options)?;
        self.cache.put(CACHE_KEY_DEPARTMENTS, &departments)?;
        let wards = self.db.with_conn(ward_options)?;
        self.cache.put(CACHE_KEY_WARDS, &wards)?;
        let lab_tests = self.db.with_conn(lab_test_options)?;
        self.cache.put(CACHE_KEY_LAB_TESTS, &lab_tests)?;
        let drugs = self.db.with_conn(drug_options)?;
        self.cache.put(CACHE_KEY_DRUGS, &drugs)?;
        let occupancy = self.db.with_conn(occupancy_summary)?;
        self.cache.put(CACHE_KEY_BED_OCCUPANCY, &occupancy)?;
        let today = now().date().format(DATE_FORMAT).to_string();
        let stats = self.db.with_conn(|conn| department_stats(conn, &today))?;
        self.cache.put(CACHE_KEY_DEPARTMENT_STATS, &stats)?;

        let warmed = [
            CACHE_KEY_DEPARTMENTS,
            CACHE_KEY_WARDS,
            CACHE_KEY_LAB_TESTS,
            CACHE_KEY_DRUGS,
            CACHE_KEY_BED_OCCUPANCY,
            CACHE_KEY_DEPARTMENT_STATS,
        ]
        .iter()
        .map(|k| k.to_string())
        .collect();
        tracing::info!(?warmed, "cache warmed");
        Ok(warmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service() -> (Database, MasterDataService) {
        let db = Database::open_in_memory().unwrap();
        let cache = CacheService::new(db.clone(), Duration::from_secs(3600));
        (db.clone(), MasterDataService::new(db, cache))
    }

    #[test]
    fn department_options_are_active_only_and_sorted() {
        let (db, svc) = service();
        db.with_conn(|c| {
            insert_department(c, "Surgery", "SUR")?;
            insert_department(c, "cardiology", "CAR")?;
            let closed = insert_department(c, "Anaesthesia", "ANA")?;
            set_active(c, MasterTable::Departments, closed, false)
        })
        .unwrap();

        let names: Vec<String> = svc.departments().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["cardiology", "Surgery"]);
    }

    #[test]
    fn drug_options_exclude_discontinued_and_report_available_stock() {
        let (db, svc) = service();
        db.with_conn(|c| {
            let id = insert_drug(
                c,
                &NewDrug {
                    name: "Paracetamol",
                    strength: Some("500mg"),
                    unit_price_cents: 20,
                    stock_quantity: 100,
                    ..Default::default()
                },
            )?;
            c.execute("UPDATE drugs SET reserved_quantity = 30 WHERE id = ?1", [id])?;
            let old = insert_drug(
                c,
                &NewDrug {
                    name: "Aspirin",
                    ..Default::default()
                },
            )?;
            set_active(c, MasterTable::Drugs, old, false)
        })
        .unwrap();

        let drugs = svc.drugs().unwrap();
        assert_eq!(drugs.len(), 1);
        assert_eq!(drugs[0].name, "Paracetamol");
        assert_eq!(drugs[0].available_quantity, 70);
    }

    #[test]
    fn cached_options_are_stale_until_cleared() {
        let (db, svc) = service();
        db.with_conn(|c| insert_lab_test(c, "Full Blood Count", "FBC", 1500))
            .unwrap();
        assert_eq!(svc.lab_tests().unwrap().len(), 1);

        db.with_conn(|c| insert_lab_test(c, "Urinalysis", "UA", 800))
            .unwrap();
        assert_eq!(svc.lab_tests().unwrap().len(), 1, "served from cache");

        svc.cache.clear(Some("master:")).unwrap();
        assert_eq!(svc.lab_tests().unwrap().len(), 2);
    }

    #[test]
    fn warm_writes_every_master_key() {
        let (_db, svc) = service();
        let warmed = svc.warm().unwrap();
        assert!(warmed.contains(&CACHE_KEY_DEPARTMENTS.to_string()));
        let stats = svc.cache.stats().unwrap();
        assert_eq!(stats.entries, warmed.len() as i64);
    }

    #[test]
    fn set_active_on_missing_row_is_not_found() {
        let (db, _svc) = service();
        let err = db
            .with_conn(|c| set_active(c, MasterTable::Wards, 99, false))
            .unwrap_err();
        assert!(matches!(err, HmsError::NotFound { .. }));
    }

    #[test]
    fn ensure_branch_is_idempotent() {
        let (db, _svc) = service();
        let (a, b) = db
            .with_conn(|c| Ok((ensure_branch(c, "Main")?, ensure_branch(c, "Main")?)))
            .unwrap();
        assert_eq!(a, b);
    }
}
