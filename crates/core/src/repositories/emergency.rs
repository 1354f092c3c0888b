//! Emergency department: arrivals, triage, the board, orders and hand-off to OPD.
//!
//! Triage records a category and a disposition chosen by the clinician. The two are independent:
//! the disposition decides the next status (`triaged` stays in the department, `pending_opd` waits
//! for [`EmergencyService::transfer_to_opd`]). A critical category routed to OPD is accepted but
//! flagged.

use crate::db::{fmt_datetime, now, parse_datetime, Database};
use crate::error::text_field;
use crate::models::{
    enum_column, Disposition, EmergencyOrderStatus, EmergencyOrderType, EmergencyStatus,
    TriageCategory, User, UserRole,
};
use crate::repositories::appointments::{get_appointment, insert_appointment, NewAppointment};
use crate::repositories::patients::get_patient;
use crate::repositories::users::require_role;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const EMERGENCY_PATIENT_SELECT: &str = "SELECT ep.id, ep.patient_id,
        COALESCE(p.first_name || ' ' || p.last_name, ep.temp_name, 'Unknown'),
        ep.status, ep.assigned_physician_id, ep.arrival_mode, ep.chief_complaint, ep.arrived_at,
        (SELECT t.category FROM triage_assessments t
          WHERE t.emergency_patient_id = ep.id
          ORDER BY t.assessed_at DESC, t.id DESC LIMIT 1)
    FROM emergency_patients ep
    LEFT JOIN patients p ON p.id = ep.patient_id";

const TRIAGE_COLUMNS: &str = "id, emergency_patient_id, category, disposition, systolic_bp,
    diastolic_bp, heart_rate, respiratory_rate, temperature, spo2, gcs, pain_score, blood_glucose,
    notes, assessed_by, assessed_at";

const ORDER_COLUMNS: &str =
    "id, emergency_patient_id, order_type, description, status, ordered_by, ordered_at";

fn row_to_emergency_patient(
    row: &rusqlite::Row<'_>,
) -> Result<dto::EmergencyPatientRes, rusqlite::Error> {
    let status: String = row.get(3)?;
    Ok(dto::EmergencyPatientRes {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        display_name: row.get(2)?,
        status: enum_column::<EmergencyStatus>(3, &status)?.to_string(),
        assigned_physician_id: row.get(4)?,
        arrival_mode: row.get(5)?,
        chief_complaint: row.get(6)?,
        arrived_at: row.get(7)?,
        latest_category: row.get(8)?,
    })
}

fn row_to_assessment(row: &rusqlite::Row<'_>) -> Result<dto::TriageAssessmentRes, rusqlite::Error> {
    Ok(dto::TriageAssessmentRes {
        id: row.get(0)?,
        emergency_patient_id: row.get(1)?,
        category: row.get(2)?,
        disposition: row.get(3)?,
        vitals: dto::VitalsDto {
            systolic_bp: row.get(4)?,
            diastolic_bp: row.get(5)?,
            heart_rate: row.get(6)?,
            respiratory_rate: row.get(7)?,
            temperature: row.get(8)?,
            spo2: row.get(9)?,
            gcs: row.get(10)?,
            pain_score: row.get(11)?,
            blood_glucose: row.get(12)?,
        },
        notes: row.get(13)?,
        assessed_by: row.get(14)?,
        assessed_at: row.get(15)?,
    })
}

fn row_to_order(row: &rusqlite::Row<'_>) -> Result<dto::EmergencyOrderRes, rusqlite::Error> {
    Ok(dto::EmergencyOrderRes {
        id: row.get(0)?,
        emergency_patient_id: row.get(1)?,
        order_type: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        ordered_by: row.get(5)?,
        ordered_at: row.get(6)?,
    })
}

pub fn get_emergency_patient(conn: &Connection, id: i64) -> HmsResult<dto::EmergencyPatientRes> {
    conn.query_row(
        &format!("{EMERGENCY_PATIENT_SELECT} WHERE ep.id = ?1"),
        params![id],
        row_to_emergency_patient,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("emergency patient", id))
}

fn status_of(patient: &dto::EmergencyPatientRes) -> HmsResult<EmergencyStatus> {
    patient.status.parse()
}

fn is_closed(status: EmergencyStatus) -> bool {
    matches!(
        status,
        EmergencyStatus::Admitted | EmergencyStatus::TransferredToOpd | EmergencyStatus::Discharged
    )
}

fn set_status(conn: &Connection, id: i64, status: EmergencyStatus) -> HmsResult<()> {
    conn.execute(
        "UPDATE emergency_patients SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(())
}

/// Loads an emergency patient that is still in the department.
fn open_patient(conn: &Connection, id: i64) -> HmsResult<(dto::EmergencyPatientRes, EmergencyStatus)> {
    let patient = get_emergency_patient(conn, id)?;
    let status = status_of(&patient)?;
    if is_closed(status) {
        return Err(HmsError::Conflict(format!(
            "emergency patient {id} has left the department ({status})"
        )));
    }
    Ok((patient, status))
}

/// Board position: untriaged arrivals first, then by category severity.
fn board_rank(latest_category: Option<&str>) -> u8 {
    match latest_category.and_then(|c| c.parse::<TriageCategory>().ok()) {
        None => 0,
        Some(category) => 1 + category.severity_rank(),
    }
}

fn required<'a>(field: &str, value: Option<&'a str>) -> HmsResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(HmsError::validation(field, "is required")),
    }
}

#[derive(Clone, Debug)]
pub struct EmergencyService {
    db: Database,
}

impl EmergencyService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records an arrival, either for a registered patient or under a temporary identity.
    pub fn register(
        &self,
        req: &dto::RegisterEmergencyPatientReq,
    ) -> HmsResult<dto::EmergencyPatientRes> {
        let temp_name = text_field("temp_name", NonEmptyText::optional(req.temp_name.as_deref()))?;
        if req.patient_id.is_none() && temp_name.is_none() {
            return Err(HmsError::validation(
                "temp_name",
                "required when no patient_id is given",
            ));
        }
        if let Some(age) = req.temp_age {
            if !(0..=150).contains(&age) {
                return Err(HmsError::validation("temp_age", "must be between 0 and 150"));
            }
        }
        let temp_gender =
            text_field("temp_gender", NonEmptyText::optional(req.temp_gender.as_deref()))?;
        let arrival_mode =
            text_field("arrival_mode", NonEmptyText::optional(req.arrival_mode.as_deref()))?;
        let chief_complaint = text_field(
            "chief_complaint",
            NonEmptyText::optional(req.chief_complaint.as_deref()),
        )?;

        let registered = self.db.with_transaction(|tx| {
            if let Some(patient_id) = req.patient_id {
                get_patient(tx, patient_id).map_err(|_| {
                    HmsError::validation("patient_id", format!("patient {patient_id} does not exist"))
                })?;
            }
            tx.execute(
                "INSERT INTO emergency_patients
                    (patient_id, temp_name, temp_gender, temp_age, arrival_mode, chief_complaint,
                     status, arrived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    req.patient_id,
                    temp_name.as_ref().map(NonEmptyText::as_str),
                    temp_gender.as_ref().map(NonEmptyText::as_str),
                    req.temp_age,
                    arrival_mode.as_ref().map(NonEmptyText::as_str),
                    chief_complaint.as_ref().map(NonEmptyText::as_str),
                    EmergencyStatus::Waiting.as_str(),
                    fmt_datetime(&now()),
                ],
            )?;
            get_emergency_patient(tx, tx.last_insert_rowid())
        })?;
        tracing::info!(
            emergency_patient_id = registered.id,
            registered = registered.patient_id.is_some(),
            "emergency arrival recorded"
        );
        Ok(registered)
    }

    pub fn get(&self, id: i64) -> HmsResult<dto::EmergencyPatientRes> {
        self.db.with_conn(|conn| get_emergency_patient(conn, id))
    }

    /// Patients still in the department: untriaged first, then red, yellow, green, black, each
    /// group by arrival.
    pub fn board(&self) -> HmsResult<dto::EmergencyBoardRes> {
        let mut patients = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{EMERGENCY_PATIENT_SELECT} WHERE ep.status NOT IN (?1, ?2, ?3)"
            ))?;
            let rows = stmt.query_map(
                params![
                    EmergencyStatus::Admitted.as_str(),
                    EmergencyStatus::TransferredToOpd.as_str(),
                    EmergencyStatus::Discharged.as_str()
                ],
                row_to_emergency_patient,
            )?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        patients.sort_by(|a, b| {
            board_rank(a.latest_category.as_deref())
                .cmp(&board_rank(b.latest_category.as_deref()))
                .then_with(|| a.arrived_at.cmp(&b.arrived_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(dto::EmergencyBoardRes { patients })
    }

    /// Stores a triage assessment and moves the patient according to the chosen disposition.
    ///
    /// An `emergency` disposition only marks waiting, triaged or OPD-pending patients as triaged;
    /// a patient already in treatment keeps that status.
    pub fn record_triage(
        &self,
        emergency_patient_id: i64,
        req: &dto::TriageReq,
        assessor: &User,
    ) -> HmsResult<dto::TriageRes> {
        let category =
            TriageCategory::parse_field("category", required("category", req.category.as_deref())?)?;
        let disposition = Disposition::parse_field(
            "disposition",
            required("disposition", req.disposition.as_deref())?,
        )?;
        let notes = text_field("notes", NonEmptyText::optional(req.notes.as_deref()))?;
        let vitals = &req.vitals;

        let assessment = self.db.with_transaction(|tx| {
            let (_, current) = open_patient(tx, emergency_patient_id)?;
            tx.execute(
                "INSERT INTO triage_assessments
                    (emergency_patient_id, category, disposition, systolic_bp, diastolic_bp,
                     heart_rate, respiratory_rate, temperature, spo2, gcs, pain_score,
                     blood_glucose, notes, assessed_by, assessed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    emergency_patient_id,
                    category.as_str(),
                    disposition.as_str(),
                    vitals.systolic_bp,
                    vitals.diastolic_bp,
                    vitals.heart_rate,
                    vitals.respiratory_rate,
                    vitals.temperature,
                    vitals.spo2,
                    vitals.gcs,
                    vitals.pain_score,
                    vitals.blood_glucose,
                    notes.as_ref().map(NonEmptyText::as_str),
                    assessor.id,
                    fmt_datetime(&now()),
                ],
            )?;
            let id = tx.last_insert_rowid();
            // Re-triage never moves a patient out of treatment back onto the waiting side.
            let next = match (disposition, current) {
                (
                    Disposition::Emergency,
                    EmergencyStatus::Waiting | EmergencyStatus::Triaged | EmergencyStatus::PendingOpd,
                ) => Some(EmergencyStatus::Triaged),
                (Disposition::Emergency, _) => None,
                (Disposition::Opd, _) => Some(EmergencyStatus::PendingOpd),
            };
            if let Some(next) = next {
                set_status(tx, emergency_patient_id, next)?;
            }
            tx.query_row(
                &format!("SELECT {TRIAGE_COLUMNS} FROM triage_assessments WHERE id = ?1"),
                params![id],
                row_to_assessment,
            )
            .map_err(HmsError::from)
        })?;

        let acuity_mismatch = category.is_critical() && disposition == Disposition::Opd;
        if acuity_mismatch {
            tracing::warn!(
                emergency_patient_id,
                category = %category,
                disposition = %disposition,
                "critical triage category routed to OPD"
            );
        }
        tracing::info!(
            emergency_patient_id,
            assessment_id = assessment.id,
            category = %category,
            disposition = %disposition,
            assessed_by = assessor.id,
            "triage recorded"
        );
        Ok(dto::TriageRes {
            assessment,
            acuity_mismatch,
        })
    }

    pub fn list_triage(&self, emergency_patient_id: i64) -> HmsResult<dto::ListTriageRes> {
        let assessments = self.db.with_conn(|conn| {
            get_emergency_patient(conn, emergency_patient_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRIAGE_COLUMNS} FROM triage_assessments
                 WHERE emergency_patient_id = ?1
                 ORDER BY assessed_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![emergency_patient_id], row_to_assessment)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        Ok(dto::ListTriageRes { assessments })
    }

    /// Assigns the treating physician; a waiting or triaged patient moves into treatment.
    pub fn assign_physician(
        &self,
        emergency_patient_id: i64,
        req: &dto::AssignPhysicianReq,
    ) -> HmsResult<dto::EmergencyPatientRes> {
        let updated = self.db.with_transaction(|tx| {
            let (_, status) = open_patient(tx, emergency_patient_id)?;
            require_role(tx, "physician_id", req.physician_id, UserRole::Doctor)?;
            tx.execute(
                "UPDATE emergency_patients SET assigned_physician_id = ?1 WHERE id = ?2",
                params![req.physician_id, emergency_patient_id],
            )?;
            if matches!(status, EmergencyStatus::Waiting | EmergencyStatus::Triaged) {
                set_status(tx, emergency_patient_id, EmergencyStatus::InTreatment)?;
            }
            get_emergency_patient(tx, emergency_patient_id)
        })?;
        tracing::info!(emergency_patient_id, physician_id = req.physician_id, "physician assigned");
        Ok(updated)
    }

    /// Replaces a temporary identity with a registered patient record.
    pub fn link_patient(
        &self,
        emergency_patient_id: i64,
        req: &dto::LinkPatientReq,
    ) -> HmsResult<dto::EmergencyPatientRes> {
        self.db.with_transaction(|tx| {
            let (current, _) = open_patient(tx, emergency_patient_id)?;
            if let Some(existing) = current.patient_id {
                return Err(HmsError::Conflict(format!(
                    "emergency patient {emergency_patient_id} is already linked to patient {existing}"
                )));
            }
            get_patient(tx, req.patient_id).map_err(|_| {
                HmsError::validation("patient_id", format!("patient {} does not exist", req.patient_id))
            })?;
            tx.execute(
                "UPDATE emergency_patients SET patient_id = ?1 WHERE id = ?2",
                params![req.patient_id, emergency_patient_id],
            )?;
            get_emergency_patient(tx, emergency_patient_id)
        })
    }

    /// Books the OPD appointment for a patient whose triage disposition was `opd`.
    pub fn transfer_to_opd(
        &self,
        emergency_patient_id: i64,
        req: &dto::TransferToOpdReq,
    ) -> HmsResult<dto::AppointmentRes> {
        let scheduled_at = match req.scheduled_at.as_deref() {
            Some(raw) => parse_datetime(raw).map_err(|_| {
                HmsError::validation("scheduled_at", "expected YYYY-MM-DD HH:MM:SS")
            })?,
            None => now(),
        };
        let appointment = self.db.with_transaction(|tx| {
            let (patient, status) = open_patient(tx, emergency_patient_id)?;
            if status != EmergencyStatus::PendingOpd {
                return Err(HmsError::Conflict(format!(
                    "emergency patient {emergency_patient_id} is {status}, not pending_opd"
                )));
            }
            let patient_id = patient.patient_id.ok_or_else(|| {
                HmsError::validation(
                    "patient_id",
                    "register the patient before transferring to OPD",
                )
            })?;
            let id = insert_appointment(
                tx,
                &NewAppointment {
                    patient_id,
                    physician_id: req.physician_id,
                    department_id: req.department_id,
                    scheduled_at,
                    notes: NonEmptyText::new(format!(
                        "Referred from emergency (arrival #{emergency_patient_id})"
                    ))
                    .ok(),
                },
            )?;
            set_status(tx, emergency_patient_id, EmergencyStatus::TransferredToOpd)?;
            get_appointment(tx, id)
        })?;
        tracing::info!(
            emergency_patient_id,
            appointment_id = appointment.id,
            "emergency patient transferred to OPD"
        );
        Ok(appointment)
    }

    pub fn create_order(
        &self,
        emergency_patient_id: i64,
        req: &dto::EmergencyOrderReq,
        ordered_by: &User,
    ) -> HmsResult<dto::EmergencyOrderRes> {
        let order_type = EmergencyOrderType::parse_field(
            "order_type",
            required("order_type", req.order_type.as_deref())?,
        )?;
        let description = text_field(
            "description",
            NonEmptyText::new(req.description.as_deref().unwrap_or_default()),
        )?;
        self.db.with_transaction(|tx| {
            open_patient(tx, emergency_patient_id)?;
            tx.execute(
                "INSERT INTO emergency_orders
                    (emergency_patient_id, order_type, description, status, ordered_by, ordered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    emergency_patient_id,
                    order_type.as_str(),
                    description.as_str(),
                    EmergencyOrderStatus::Pending.as_str(),
                    ordered_by.id,
                    fmt_datetime(&now()),
                ],
            )?;
            get_order(tx, tx.last_insert_rowid())
        })
    }

    pub fn list_orders(&self, emergency_patient_id: i64) -> HmsResult<dto::ListEmergencyOrdersRes> {
        let orders = self.db.with_conn(|conn| {
            get_emergency_patient(conn, emergency_patient_id)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM emergency_orders
                 WHERE emergency_patient_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![emergency_patient_id], row_to_order)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        Ok(dto::ListEmergencyOrdersRes { orders })
    }

    pub fn update_order_status(
        &self,
        order_id: i64,
        req: &dto::UpdateStatusReq,
    ) -> HmsResult<dto::EmergencyOrderRes> {
        let next = EmergencyOrderStatus::parse_field("status", &req.status)?;
        self.db.with_transaction(|tx| {
            let order = get_order(tx, order_id)?;
            let current: EmergencyOrderStatus = order.status.parse()?;
            if matches!(
                current,
                EmergencyOrderStatus::Completed | EmergencyOrderStatus::Cancelled
            ) && current != next
            {
                return Err(HmsError::Conflict(format!(
                    "order {order_id} is already {current}"
                )));
            }
            tx.execute(
                "UPDATE emergency_orders SET status = ?1 WHERE id = ?2",
                params![next.as_str(), order_id],
            )?;
            get_order(tx, order_id)
        })
    }
}

fn get_order(conn: &Connection, id: i64) -> HmsResult<dto::EmergencyOrderRes> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM emergency_orders WHERE id = ?1"),
        params![id],
        row_to_order,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("emergency order", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    fn arrival(name: &str) -> dto::RegisterEmergencyPatientReq {
        dto::RegisterEmergencyPatientReq {
            temp_name: Some(name.into()),
            chief_complaint: Some("chest pain".into()),
            ..Default::default()
        }
    }

    fn triage(category: &str, disposition: &str) -> dto::TriageReq {
        dto::TriageReq {
            category: Some(category.into()),
            disposition: Some(disposition.into()),
            vitals: dto::VitalsDto {
                heart_rate: Some(128.0),
                spo2: Some(91.0),
                ..Default::default()
            },
            notes: None,
        }
    }

    fn backdate(fx: &Fixture, id: i64, arrived_at: &str) {
        fx.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE emergency_patients SET arrived_at = ?1 WHERE id = ?2",
                    params![arrived_at, id],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn triage_disposition_sets_status() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let stay = svc.register(&arrival("Unknown male")).unwrap();
        let refer = svc.register(&arrival("Unknown female")).unwrap();

        let res = svc.record_triage(stay.id, &triage("yellow", "emergency"), &fx.nurse()).unwrap();
        assert!(!res.acuity_mismatch);
        assert_eq!(res.assessment.vitals.heart_rate, Some(128.0));
        assert_eq!(svc.get(stay.id).unwrap().status, "triaged");

        svc.record_triage(refer.id, &triage("green", "opd"), &fx.nurse()).unwrap();
        assert_eq!(svc.get(refer.id).unwrap().status, "pending_opd");
    }

    #[test]
    fn missing_category_or_disposition_is_rejected() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc.register(&arrival("Unknown")).unwrap();

        let mut req = triage("red", "emergency");
        req.category = None;
        let err = svc.record_triage(ep.id, &req, &fx.nurse()).unwrap_err();
        assert_eq!(err.field(), Some("category"));

        let mut req = triage("red", "emergency");
        req.disposition = Some("  ".into());
        let err = svc.record_triage(ep.id, &req, &fx.nurse()).unwrap_err();
        assert_eq!(err.field(), Some("disposition"));

        let err = svc
            .record_triage(ep.id, &triage("purple", "emergency"), &fx.nurse())
            .unwrap_err();
        assert_eq!(err.field(), Some("category"));
        assert!(svc.list_triage(ep.id).unwrap().assessments.is_empty());
    }

    #[test]
    fn critical_category_to_opd_is_flagged_not_blocked() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc.register(&arrival("Unknown")).unwrap();
        let res = svc.record_triage(ep.id, &triage("red", "opd"), &fx.nurse()).unwrap();
        assert!(res.acuity_mismatch);
        assert_eq!(svc.get(ep.id).unwrap().status, "pending_opd");
    }

    #[test]
    fn board_orders_untriaged_then_severity_then_arrival() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let green = svc.register(&arrival("green")).unwrap();
        let red_late = svc.register(&arrival("red late")).unwrap();
        let red_early = svc.register(&arrival("red early")).unwrap();
        let waiting = svc.register(&arrival("waiting")).unwrap();
        backdate(&fx, green.id, "2024-01-01 08:00:00");
        backdate(&fx, red_late.id, "2024-01-01 09:30:00");
        backdate(&fx, red_early.id, "2024-01-01 09:00:00");
        backdate(&fx, waiting.id, "2024-01-01 10:00:00");

        svc.record_triage(green.id, &triage("green", "emergency"), &fx.nurse()).unwrap();
        svc.record_triage(red_late.id, &triage("red", "emergency"), &fx.nurse()).unwrap();
        svc.record_triage(red_early.id, &triage("red", "emergency"), &fx.nurse()).unwrap();

        let order: Vec<i64> = svc.board().unwrap().patients.iter().map(|p| p.id).collect();
        assert_eq!(order, vec![waiting.id, red_early.id, red_late.id, green.id]);
    }

    #[test]
    fn transfer_requires_registered_patient_and_opd_disposition() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc.register(&arrival("Unknown")).unwrap();
        let transfer = dto::TransferToOpdReq {
            physician_id: fx.doctor_id,
            department_id: fx.department_id,
            scheduled_at: None,
        };

        let err = svc.transfer_to_opd(ep.id, &transfer).unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));

        svc.record_triage(ep.id, &triage("green", "opd"), &fx.nurse()).unwrap();
        let err = svc.transfer_to_opd(ep.id, &transfer).unwrap_err();
        assert_eq!(err.field(), Some("patient_id"));

        svc.link_patient(ep.id, &dto::LinkPatientReq { patient_id: fx.patient_id })
            .unwrap();
        let appointment = svc.transfer_to_opd(ep.id, &transfer).unwrap();
        assert_eq!(appointment.patient_id, fx.patient_id);
        assert_eq!(svc.get(ep.id).unwrap().status, "transferred_to_opd");
        assert!(svc.board().unwrap().patients.is_empty());

        let err = svc.record_triage(ep.id, &triage("green", "opd"), &fx.nurse()).unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
    }

    #[test]
    fn registered_arrival_shows_patient_name() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc
            .register(&dto::RegisterEmergencyPatientReq {
                patient_id: Some(fx.patient_id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ep.display_name, "Ada Obi");
        assert!(svc.register(&dto::RegisterEmergencyPatientReq::default()).is_err());
    }

    #[test]
    fn assigning_physician_starts_treatment() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc.register(&arrival("Unknown")).unwrap();
        let updated = svc
            .assign_physician(ep.id, &dto::AssignPhysicianReq { physician_id: fx.doctor_id })
            .unwrap();
        assert_eq!(updated.assigned_physician_id, Some(fx.doctor_id));
        assert_eq!(updated.status, "in_treatment");

        let err = svc
            .assign_physician(ep.id, &dto::AssignPhysicianReq { physician_id: fx.nurse_id })
            .unwrap_err();
        assert_eq!(err.field(), Some("physician_id"));
    }

    #[test]
    fn retriage_keeps_patient_in_treatment() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc.register(&arrival("Unknown")).unwrap();
        svc.record_triage(ep.id, &triage("yellow", "emergency"), &fx.nurse()).unwrap();
        svc.assign_physician(ep.id, &dto::AssignPhysicianReq { physician_id: fx.doctor_id })
            .unwrap();

        svc.record_triage(ep.id, &triage("red", "emergency"), &fx.nurse()).unwrap();
        let after = svc.get(ep.id).unwrap();
        assert_eq!(after.status, "in_treatment");
        assert_eq!(after.assigned_physician_id, Some(fx.doctor_id));
        assert_eq!(after.latest_category.as_deref(), Some("red"));
        assert_eq!(svc.list_triage(ep.id).unwrap().assessments.len(), 2);

        let pending = svc.register(&arrival("Unknown female")).unwrap();
        svc.record_triage(pending.id, &triage("green", "opd"), &fx.nurse()).unwrap();
        svc.record_triage(pending.id, &triage("yellow", "emergency"), &fx.nurse()).unwrap();
        assert_eq!(svc.get(pending.id).unwrap().status, "triaged");
    }

    #[test]
    fn orders_follow_their_lifecycle() {
        let fx = Fixture::new();
        let svc = EmergencyService::new(fx.db.clone());
        let ep = svc.register(&arrival("Unknown")).unwrap();
        let order = svc
            .create_order(
                ep.id,
                &dto::EmergencyOrderReq {
                    order_type: Some("imaging".into()),
                    description: Some("CXR".into()),
                },
                &fx.doctor(),
            )
            .unwrap();
        assert_eq!(order.status, "pending");

        let done = svc
            .update_order_status(order.id, &dto::UpdateStatusReq { status: "completed".into() })
            .unwrap();
        assert_eq!(done.status, "completed");
        let err = svc
            .update_order_status(order.id, &dto::UpdateStatusReq { status: "pending".into() })
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
        assert_eq!(svc.list_orders(ep.id).unwrap().orders.len(), 1);
    }
}
