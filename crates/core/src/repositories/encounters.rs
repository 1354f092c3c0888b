//! Encounters: the care episodes that orders, prescriptions, beds and billing hang off.

use crate::db::{fmt_datetime, now, Database};
use crate::models::{datetime_column, enum_column, Encounter, EncounterStatus, EncounterType};
use crate::repositories::master_data::department_exists;
use crate::repositories::patients::get_patient;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

const ENCOUNTER_COLUMNS: &str =
    "id, patient_id, encounter_type, status, department_id, started_at, completed_at";

fn row_to_encounter(row: &rusqlite::Row<'_>) -> Result<Encounter, rusqlite::Error> {
    let encounter_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let started_at: String = row.get(5)?;
    let completed_at: Option<String> = row.get(6)?;
    Ok(Encounter {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        encounter_type: enum_column(2, &encounter_type)?,
        status: enum_column(3, &status)?,
        department_id: row.get(4)?,
        started_at: datetime_column(5, &started_at)?,
        completed_at: completed_at
            .as_deref()
            .map(|v| datetime_column(6, v))
            .transpose()?,
    })
}

impl From<&Encounter> for dto::EncounterRes {
    fn from(e: &Encounter) -> Self {
        Self {
            id: e.id,
            patient_id: e.patient_id,
            encounter_type: e.encounter_type.to_string(),
            status: e.status.to_string(),
            department_id: e.department_id,
            started_at: fmt_datetime(&e.started_at),
            completed_at: e.completed_at.as_ref().map(fmt_datetime),
        }
    }
}

pub fn get_encounter(conn: &Connection, id: i64) -> HmsResult<Encounter> {
    conn.query_row(
        &format!("SELECT {ENCOUNTER_COLUMNS} FROM encounters WHERE id = ?1"),
        params![id],
        row_to_encounter,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("encounter", id))
}

pub fn insert_encounter(
    conn: &Connection,
    patient_id: i64,
    encounter_type: EncounterType,
    department_id: Option<i64>,
    started_at: NaiveDateTime,
) -> HmsResult<i64> {
    conn.execute(
        "INSERT INTO encounters (patient_id, encounter_type, status, department_id, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient_id,
            encounter_type.as_str(),
            EncounterStatus::Active.as_str(),
            department_id,
            fmt_datetime(&started_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Marks an encounter COMPLETED and releases any bed it still holds.
///
/// Returns the number of bed assignments released. Completing an already completed encounter
/// is a no-op.
pub fn complete_encounter(conn: &Connection, id: i64, at: NaiveDateTime) -> HmsResult<usize> {
    let encounter = get_encounter(conn, id)?;
    if encounter.status == EncounterStatus::Completed {
        return Ok(0);
    }
    let at = fmt_datetime(&at);
    conn.execute(
        "UPDATE encounters SET status = ?1, completed_at = ?2 WHERE id = ?3",
        params![EncounterStatus::Completed.as_str(), at, id],
    )?;
    let released = conn.execute(
        "UPDATE bed_assignments SET released_at = ?1
         WHERE encounter_id = ?2 AND released_at IS NULL",
        params![at, id],
    )?;
    Ok(released)
}

/// Activity counts per active department for the admin dashboard.
pub fn department_stats(conn: &Connection, today: &str) -> HmsResult<dto::DepartmentStatsRes> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.name,
            (SELECT COUNT(*) FROM encounters e
              WHERE e.department_id = d.id AND e.status = 'ACTIVE'),
            (SELECT COUNT(*) FROM appointments a
              WHERE a.department_id = d.id AND date(a.scheduled_at) = ?1)
         FROM departments d
         WHERE d.active = 1
         ORDER BY d.name COLLATE NOCASE, d.id",
    )?;
    let departments = stmt
        .query_map(params![today], |row| {
            Ok(dto::DepartmentStat {
                department_id: row.get(0)?,
                name: row.get(1)?,
                active_encounters: row.get(2)?,
                appointments_today: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dto::DepartmentStatsRes { departments })
}

#[derive(Clone, Debug)]
pub struct EncounterService {
    db: Database,
}

impl EncounterService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens an IPD encounter for an inpatient admission.
    pub fn admit(&self, req: &dto::AdmitPatientReq) -> HmsResult<dto::EncounterRes> {
        let encounter = self.db.with_transaction(|tx| {
            get_patient(tx, req.patient_id).map_err(|_| {
                HmsError::validation("patient_id", format!("patient {} does not exist", req.patient_id))
            })?;
            if let Some(department_id) = req.department_id {
                if !department_exists(tx, department_id)? {
                    return Err(HmsError::validation(
                        "department_id",
                        format!("department {department_id} does not exist"),
                    ));
                }
            }
            let id = insert_encounter(tx, req.patient_id, EncounterType::Ipd, req.department_id, now())?;
            get_encounter(tx, id)
        })?;
        tracing::info!(encounter_id = encounter.id, patient_id = encounter.patient_id, "patient admitted");
        Ok((&encounter).into())
    }

    pub fn get(&self, id: i64) -> HmsResult<dto::EncounterRes> {
        let encounter = self.db.with_conn(|conn| get_encounter(conn, id))?;
        Ok((&encounter).into())
    }

    pub fn complete(&self, id: i64) -> HmsResult<dto::EncounterRes> {
        let (encounter, released) = self.db.with_transaction(|tx| {
            let released = complete_encounter(tx, id, now())?;
            Ok((get_encounter(tx, id)?, released))
        })?;
        tracing::info!(encounter_id = id, beds_released = released, "encounter completed");
        Ok((&encounter).into())
    }

    pub fn department_stats(&self) -> HmsResult<dto::DepartmentStatsRes> {
        let today = now().date().format(crate::constants::DATE_FORMAT).to_string();
        self.db.with_conn(|conn| department_stats(conn, &today))
    }
}
