//! OPD appointments. Booking opens an OPD encounter whose id the appointment shares.

use crate::db::{fmt_datetime, now, parse_datetime, Database};
use crate::error::text_field;
use crate::models::{enum_column, AppointmentStatus, EncounterType, UserRole};
use crate::repositories::encounters::{complete_encounter, insert_encounter};
use crate::repositories::master_data::department_exists;
use crate::repositories::patients::get_patient;
use crate::repositories::users::require_role;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use chrono::{NaiveDate, NaiveDateTime};
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, physician_id, department_id, scheduled_at, status, notes, updated_at";

fn row_to_appointment(row: &rusqlite::Row<'_>) -> Result<dto::AppointmentRes, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let status: String = row.get(5)?;
    let status: AppointmentStatus = enum_column(5, &status)?;
    Ok(dto::AppointmentRes {
        id,
        encounter_id: id,
        patient_id: row.get(1)?,
        physician_id: row.get(2)?,
        department_id: row.get(3)?,
        scheduled_at: row.get(4)?,
        status: status.to_string(),
        notes: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn get_appointment(conn: &Connection, id: i64) -> HmsResult<dto::AppointmentRes> {
    conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        row_to_appointment,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("appointment", id))
}

/// A validated booking request.
pub(crate) struct NewAppointment {
    pub patient_id: i64,
    pub physician_id: i64,
    pub department_id: i64,
    pub scheduled_at: NaiveDateTime,
    pub notes: Option<NonEmptyText>,
}

/// Checks references and writes the OPD encounter and its appointment. Returns the shared id.
pub(crate) fn insert_appointment(conn: &Connection, new: &NewAppointment) -> HmsResult<i64> {
    get_patient(conn, new.patient_id).map_err(|e| match e {
        HmsError::NotFound { .. } => HmsError::validation(
            "patient_id",
            format!("patient {} does not exist", new.patient_id),
        ),
        other => other,
    })?;
    require_role(conn, "physician_id", new.physician_id, UserRole::Doctor)?;
    if !department_exists(conn, new.department_id)? {
        return Err(HmsError::validation(
            "department_id",
            format!("department {} does not exist", new.department_id),
        ));
    }

    let created_at = now();
    let encounter_id = insert_encounter(
        conn,
        new.patient_id,
        EncounterType::Opd,
        Some(new.department_id),
        created_at,
    )?;
    let created_at = fmt_datetime(&created_at);
    conn.execute(
        "INSERT INTO appointments
            (id, patient_id, physician_id, department_id, scheduled_at, status, notes,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            encounter_id,
            new.patient_id,
            new.physician_id,
            new.department_id,
            fmt_datetime(&new.scheduled_at),
            AppointmentStatus::Scheduled.as_str(),
            new.notes.as_ref().map(NonEmptyText::as_str),
            created_at,
        ],
    )?;
    Ok(encounter_id)
}

/// Filters for listing appointments.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub date: Option<NaiveDate>,
    pub physician_id: Option<i64>,
    pub patient_id: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct AppointmentService {
    db: Database,
}

impl AppointmentService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn book(&self, req: &dto::CreateAppointmentReq) -> HmsResult<dto::AppointmentRes> {
        let new = NewAppointment {
            patient_id: req.patient_id,
            physician_id: req.physician_id,
            department_id: req.department_id,
            scheduled_at: parse_datetime(&req.scheduled_at).map_err(|_| {
                HmsError::validation("scheduled_at", "expected YYYY-MM-DD HH:MM:SS")
            })?,
            notes: text_field("notes", NonEmptyText::optional(req.notes.as_deref()))?,
        };
        let appointment = self.db.with_transaction(|tx| {
            let id = insert_appointment(tx, &new)?;
            get_appointment(tx, id)
        })?;
        tracing::info!(
            appointment_id = appointment.id,
            physician_id = appointment.physician_id,
            scheduled_at = %appointment.scheduled_at,
            "appointment booked"
        );
        Ok(appointment)
    }

    pub fn get(&self, id: i64) -> HmsResult<dto::AppointmentRes> {
        self.db.with_conn(|conn| get_appointment(conn, id))
    }

    pub fn list(&self, filter: &AppointmentFilter) -> HmsResult<dto::ListAppointmentsRes> {
        let date = filter.date.map(|d| d.format(crate::constants::DATE_FORMAT).to_string());
        let appointments = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE (?1 IS NULL OR date(scheduled_at) = ?1)
                   AND (?2 IS NULL OR physician_id = ?2)
                   AND (?3 IS NULL OR patient_id = ?3)
                 ORDER BY scheduled_at, id"
            ))?;
            let rows = stmt.query_map(
                params![date, filter.physician_id, filter.patient_id],
                row_to_appointment,
            )?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        Ok(dto::ListAppointmentsRes { appointments })
    }

    /// Moves an appointment along the visit flow.
    ///
    /// Reaching a terminal status (completed, cancelled, no-show) completes the encounter.
    pub fn update_status(
        &self,
        id: i64,
        req: &dto::UpdateStatusReq,
    ) -> HmsResult<dto::AppointmentRes> {
        let next = AppointmentStatus::parse_field("status", &req.status)?;
        let updated = self.db.with_transaction(|tx| {
            let current = get_appointment(tx, id)?;
            let current_status: AppointmentStatus = current.status.parse()?;
            if !current_status.can_transition_to(next) {
                return Err(HmsError::Conflict(format!(
                    "appointment {id} cannot move from {current_status} to {next}"
                )));
            }
            let at = now();
            tx.execute(
                "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![next.as_str(), fmt_datetime(&at), id],
            )?;
            if next.is_terminal() {
                complete_encounter(tx, id, at)?;
            }
            get_appointment(tx, id)
        })?;
        tracing::info!(appointment_id = id, status = %next, "appointment status changed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::encounters::get_encounter;
    use crate::models::EncounterStatus;
    use crate::test_support::Fixture;

    fn booking(fx: &Fixture) -> dto::CreateAppointmentReq {
        dto::CreateAppointmentReq {
            patient_id: fx.patient_id,
            physician_id: fx.doctor_id,
            department_id: fx.department_id,
            scheduled_at: "2024-06-03 09:30:00".into(),
            notes: Some("follow-up".into()),
        }
    }

    #[test]
    fn booking_opens_opd_encounter_with_same_id() {
        let fx = Fixture::new();
        let svc = AppointmentService::new(fx.db.clone());
        let appt = svc.book(&booking(&fx)).unwrap();
        assert_eq!(appt.id, appt.encounter_id);
        assert_eq!(appt.status, "scheduled");

        let encounter = fx.db.with_conn(|c| get_encounter(c, appt.id)).unwrap();
        assert_eq!(encounter.encounter_type, EncounterType::Opd);
        assert_eq!(encounter.patient_id, fx.patient_id);
    }

    #[test]
    fn physician_must_be_a_doctor() {
        let fx = Fixture::new();
        let mut req = booking(&fx);
        req.physician_id = fx.nurse_id;
        let err = AppointmentService::new(fx.db.clone()).book(&req).unwrap_err();
        assert_eq!(err.field(), Some("physician_id"));
    }

    #[test]
    fn bad_schedule_time_is_field_error() {
        let fx = Fixture::new();
        let mut req = booking(&fx);
        req.scheduled_at = "tomorrow".into();
        let err = AppointmentService::new(fx.db.clone()).book(&req).unwrap_err();
        assert_eq!(err.field(), Some("scheduled_at"));
    }

    #[test]
    fn failed_booking_leaves_no_encounter() {
        let fx = Fixture::new();
        let mut req = booking(&fx);
        req.department_id = 404;
        AppointmentService::new(fx.db.clone()).book(&req).unwrap_err();
        let encounters: i64 = fx
            .db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM encounters", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(encounters, 0);
    }

    #[test]
    fn status_flow_completes_encounter() {
        let fx = Fixture::new();
        let svc = AppointmentService::new(fx.db.clone());
        let appt = svc.book(&booking(&fx)).unwrap();
        for status in ["checked_in", "in_consultation", "completed"] {
            svc.update_status(appt.id, &dto::UpdateStatusReq { status: status.into() })
                .unwrap();
        }
        let encounter = fx.db.with_conn(|c| get_encounter(c, appt.id)).unwrap();
        assert_eq!(encounter.status, EncounterStatus::Completed);
    }

    #[test]
    fn invalid_transition_is_conflict() {
        let fx = Fixture::new();
        let svc = AppointmentService::new(fx.db.clone());
        let appt = svc.book(&booking(&fx)).unwrap();
        let err = svc
            .update_status(appt.id, &dto::UpdateStatusReq { status: "completed".into() })
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
        let err = svc
            .update_status(appt.id, &dto::UpdateStatusReq { status: "teleported".into() })
            .unwrap_err();
        assert_eq!(err.field(), Some("status"));
    }

    #[test]
    fn list_filters_by_date_and_physician() {
        let fx = Fixture::new();
        let svc = AppointmentService::new(fx.db.clone());
        svc.book(&booking(&fx)).unwrap();
        let mut later = booking(&fx);
        later.scheduled_at = "2024-06-04 10:00:00".into();
        svc.book(&later).unwrap();

        let on_day = svc
            .list(&AppointmentFilter {
                date: NaiveDate::from_ymd_opt(2024, 6, 3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(on_day.appointments.len(), 1);

        let other_doctor = svc
            .list(&AppointmentFilter {
                physician_id: Some(fx.nurse_id),
                ..Default::default()
            })
            .unwrap();
        assert!(other_doctor.appointments.is_empty());
    }
}
