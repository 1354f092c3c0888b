//! Prescriptions and drug stock.
//!
//! A prescription either dispenses immediately (stock leaves the shelf and a movement is
//! recorded) or reserves stock until `reserved_until`. Available stock is
//! `stock_quantity - reserved_quantity`.

use crate::db::{fmt_datetime, now, Database};
use crate::error::text_field;
use crate::models::{User, UserRole};
use crate::repositories::appointments::get_appointment;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use chrono::NaiveDateTime;
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const PRESCRIPTION_SELECT: &str = "SELECT p.id, p.patient_id, p.encounter_id, p.physician_id,
        p.drug_id, d.name, p.dosage, p.frequency, p.duration_days, p.quantity,
        p.instant_dispensing, p.stock_reserved, p.reserved_until, p.dispensed_at, p.created_at
    FROM prescriptions p
    JOIN drugs d ON d.id = p.drug_id";

fn row_to_prescription(row: &rusqlite::Row<'_>) -> Result<dto::PrescriptionRes, rusqlite::Error> {
    Ok(dto::PrescriptionRes {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        encounter_id: row.get(2)?,
        physician_id: row.get(3)?,
        drug_id: row.get(4)?,
        drug_name: row.get(5)?,
        dosage: row.get(6)?,
        frequency: row.get(7)?,
        duration_days: row.get(8)?,
        quantity: row.get(9)?,
        instant_dispensing: row.get(10)?,
        stock_reserved: row.get(11)?,
        reserved_until: row.get(12)?,
        dispensed_at: row.get(13)?,
        created_at: row.get(14)?,
    })
}

pub fn get_prescription(conn: &Connection, id: i64) -> HmsResult<dto::PrescriptionRes> {
    conn.query_row(
        &format!("{PRESCRIPTION_SELECT} WHERE p.id = ?1"),
        params![id],
        row_to_prescription,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("prescription", id))
}

/// Quantity on the shelf that is not held by a reservation, or `None` for an unknown or
/// discontinued drug.
fn available_stock(conn: &Connection, drug_id: i64) -> HmsResult<Option<i64>> {
    conn.query_row(
        "SELECT stock_quantity - reserved_quantity FROM drugs
         WHERE id = ?1 AND discontinued = 0",
        params![drug_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(HmsError::from)
}

fn ensure_available(conn: &Connection, drug_id: i64, quantity: i64) -> HmsResult<()> {
    let available = available_stock(conn, drug_id)?.ok_or_else(|| {
        HmsError::validation(
            "drug_id",
            format!("drug {drug_id} does not exist or is discontinued"),
        )
    })?;
    if quantity > available {
        return Err(HmsError::validation(
            "quantity",
            format!("only {available} units available"),
        ));
    }
    Ok(())
}

fn record_movement(
    conn: &Connection,
    drug_id: i64,
    prescription_id: i64,
    delta: i64,
    reason: &str,
    at: &str,
) -> HmsResult<()> {
    conn.execute(
        "INSERT INTO stock_movements (drug_id, prescription_id, quantity_delta, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![drug_id, prescription_id, delta, reason, at],
    )?;
    Ok(())
}

/// Takes `quantity` units off the shelf for a prescription.
fn issue_stock(
    conn: &Connection,
    drug_id: i64,
    prescription_id: i64,
    quantity: i64,
    at: &str,
) -> HmsResult<()> {
    conn.execute(
        "UPDATE drugs SET stock_quantity = stock_quantity - ?1 WHERE id = ?2",
        params![quantity, drug_id],
    )?;
    record_movement(conn, drug_id, prescription_id, -quantity, "dispensed", at)?;
    conn.execute(
        "UPDATE prescriptions SET dispensed_at = ?1 WHERE id = ?2",
        params![at, prescription_id],
    )?;
    Ok(())
}

/// Releases reservations whose window closed before `at`. Returns how many were released.
pub fn expire_reservations(conn: &Connection, at: NaiveDateTime) -> HmsResult<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, drug_id, quantity FROM prescriptions
         WHERE stock_reserved = 1 AND dispensed_at IS NULL AND reserved_until <= ?1",
    )?;
    let expired = stmt
        .query_map(params![fmt_datetime(&at)], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (prescription_id, drug_id, quantity) in &expired {
        conn.execute(
            "UPDATE drugs SET reserved_quantity = MAX(reserved_quantity - ?1, 0) WHERE id = ?2",
            params![quantity, drug_id],
        )?;
        conn.execute(
            "UPDATE prescriptions SET stock_reserved = 0, reserved_until = NULL WHERE id = ?1",
            params![prescription_id],
        )?;
    }
    Ok(expired.len())
}

#[derive(Clone, Debug)]
pub struct PharmacyService {
    db: Database,
    reservation_window: chrono::Duration,
}

impl PharmacyService {
    pub fn new(db: Database, reservation_window: chrono::Duration) -> Self {
        Self {
            db,
            reservation_window,
        }
    }

    /// Prescribes a drug for the appointment's patient, linked to its encounter.
    pub fn prescribe(
        &self,
        appointment_id: i64,
        req: &dto::CreatePrescriptionReq,
        physician: &User,
    ) -> HmsResult<dto::PrescriptionRes> {
        if physician.role != UserRole::Doctor {
            return Err(HmsError::Forbidden("only doctors can prescribe".into()));
        }
        let dosage = text_field("dosage", NonEmptyText::new(&req.dosage))?;
        let frequency = text_field("frequency", NonEmptyText::new(&req.frequency))?;
        if req.quantity <= 0 {
            return Err(HmsError::validation("quantity", "must be positive"));
        }
        if req.duration_days <= 0 {
            return Err(HmsError::validation("duration_days", "must be positive"));
        }

        let created = now();
        let at = fmt_datetime(&created);
        let reserved_until =
            (!req.instant_dispensing).then(|| fmt_datetime(&(created + self.reservation_window)));

        let prescription = self.db.with_transaction(|tx| {
            let appointment = get_appointment(tx, appointment_id)?;
            ensure_available(tx, req.drug_id, req.quantity)?;
            tx.execute(
                "INSERT INTO prescriptions
                    (patient_id, encounter_id, physician_id, drug_id, dosage, frequency,
                     duration_days, quantity, instant_dispensing, stock_reserved, reserved_until,
                     created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    appointment.patient_id,
                    appointment.encounter_id,
                    physician.id,
                    req.drug_id,
                    dosage.as_str(),
                    frequency.as_str(),
                    req.duration_days,
                    req.quantity,
                    req.instant_dispensing,
                    !req.instant_dispensing,
                    reserved_until,
                    at,
                ],
            )?;
            let id = tx.last_insert_rowid();
            if req.instant_dispensing {
                issue_stock(tx, req.drug_id, id, req.quantity, &at)?;
            } else {
                tx.execute(
                    "UPDATE drugs SET reserved_quantity = reserved_quantity + ?1 WHERE id = ?2",
                    params![req.quantity, req.drug_id],
                )?;
            }
            get_prescription(tx, id)
        })?;

        tracing::info!(
            prescription_id = prescription.id,
            encounter_id = prescription.encounter_id,
            drug_id = prescription.drug_id,
            quantity = prescription.quantity,
            instant = prescription.instant_dispensing,
            "prescription created"
        );
        Ok(prescription)
    }

    /// Hands a prescription over the counter, converting any live reservation into a movement.
    pub fn dispense(&self, prescription_id: i64) -> HmsResult<dto::PrescriptionRes> {
        let dispensed = self.db.with_transaction(|tx| {
            let prescription = get_prescription(tx, prescription_id)?;
            if prescription.dispensed_at.is_some() {
                return Err(HmsError::Conflict(format!(
                    "prescription {prescription_id} was already dispensed"
                )));
            }
            let at = fmt_datetime(&now());
            if prescription.stock_reserved {
                tx.execute(
                    "UPDATE drugs SET reserved_quantity = MAX(reserved_quantity - ?1, 0)
                     WHERE id = ?2",
                    params![prescription.quantity, prescription.drug_id],
                )?;
                tx.execute(
                    "UPDATE prescriptions SET stock_reserved = 0, reserved_until = NULL
                     WHERE id = ?1",
                    params![prescription_id],
                )?;
            } else {
                ensure_available(tx, prescription.drug_id, prescription.quantity)?;
            }
            issue_stock(tx, prescription.drug_id, prescription_id, prescription.quantity, &at)?;
            get_prescription(tx, prescription_id)
        })?;
        tracing::info!(prescription_id, "prescription dispensed");
        Ok(dispensed)
    }

    pub fn list(&self, appointment_id: i64) -> HmsResult<dto::ListPrescriptionsRes> {
        let prescriptions = self.db.with_conn(|conn| {
            let appointment = get_appointment(conn, appointment_id)?;
            let mut stmt = conn.prepare(&format!(
                "{PRESCRIPTION_SELECT} WHERE p.encounter_id = ?1 ORDER BY p.id"
            ))?;
            let rows = stmt.query_map(params![appointment.encounter_id], row_to_prescription)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        Ok(dto::ListPrescriptionsRes { prescriptions })
    }

    pub fn expire_reservations(&self, at: NaiveDateTime) -> HmsResult<usize> {
        let released = self.db.with_transaction(|tx| expire_reservations(tx, at))?;
        if released > 0 {
            tracing::info!(released, "expired stock reservations released");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    fn request(drug_id: i64, quantity: i64, instant: bool) -> dto::CreatePrescriptionReq {
        dto::CreatePrescriptionReq {
            drug_id,
            dosage: "500mg".into(),
            frequency: "tds".into(),
            duration_days: 5,
            quantity,
            instant_dispensing: instant,
        }
    }

    fn stock(fx: &Fixture, drug_id: i64) -> (i64, i64) {
        fx.db
            .with_conn(|c| {
                Ok(c.query_row(
                    "SELECT stock_quantity, reserved_quantity FROM drugs WHERE id = ?1",
                    params![drug_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?)
            })
            .unwrap()
    }

    fn service(fx: &Fixture) -> PharmacyService {
        PharmacyService::new(fx.db.clone(), chrono::Duration::minutes(60))
    }

    #[test]
    fn instant_dispensing_moves_stock() {
        let fx = Fixture::new();
        let appointment = fx.appointment();
        let drug = fx.drug("Amoxicillin", 50);
        let rx = service(&fx)
            .prescribe(appointment, &request(drug, 15, true), &fx.doctor())
            .unwrap();

        assert_eq!(rx.encounter_id, appointment);
        assert!(rx.dispensed_at.is_some());
        assert!(!rx.stock_reserved);
        assert_eq!(stock(&fx, drug), (35, 0));
    }

    #[test]
    fn deferred_dispensing_reserves_until_dispensed() {
        let fx = Fixture::new();
        let appointment = fx.appointment();
        let drug = fx.drug("Amoxicillin", 50);
        let pharmacy = service(&fx);
        let rx = pharmacy
            .prescribe(appointment, &request(drug, 20, false), &fx.doctor())
            .unwrap();
        assert!(rx.stock_reserved);
        assert!(rx.reserved_until.is_some());
        assert_eq!(stock(&fx, drug), (50, 20));

        let dispensed = pharmacy.dispense(rx.id).unwrap();
        assert!(dispensed.dispensed_at.is_some());
        assert!(!dispensed.stock_reserved);
        assert_eq!(stock(&fx, drug), (30, 0));
        assert!(matches!(pharmacy.dispense(rx.id), Err(HmsError::Conflict(_))));
    }

    #[test]
    fn reservations_count_against_availability() {
        let fx = Fixture::new();
        let appointment = fx.appointment();
        let drug = fx.drug("Amoxicillin", 10);
        let pharmacy = service(&fx);
        pharmacy
            .prescribe(appointment, &request(drug, 8, false), &fx.doctor())
            .unwrap();
        let err = pharmacy
            .prescribe(appointment, &request(drug, 3, true), &fx.doctor())
            .unwrap_err();
        assert_eq!(err.field(), Some("quantity"));
    }

    #[test]
    fn only_doctors_prescribe() {
        let fx = Fixture::new();
        let appointment = fx.appointment();
        let drug = fx.drug("Amoxicillin", 10);
        let mut nurse = fx.doctor();
        nurse.role = UserRole::Nurse;
        let err = service(&fx)
            .prescribe(appointment, &request(drug, 1, true), &nurse)
            .unwrap_err();
        assert!(matches!(err, HmsError::Forbidden(_)));
    }

    #[test]
    fn expired_reservations_return_to_shelf() {
        let fx = Fixture::new();
        let appointment = fx.appointment();
        let drug = fx.drug("Amoxicillin", 10);
        let pharmacy = service(&fx);
        pharmacy
            .prescribe(appointment, &request(drug, 4, false), &fx.doctor())
            .unwrap();

        assert_eq!(pharmacy.expire_reservations(now()).unwrap(), 0);
        let later = now() + chrono::Duration::minutes(61);
        assert_eq!(pharmacy.expire_reservations(later).unwrap(), 1);
        assert_eq!(stock(&fx, drug), (10, 0));
        assert_eq!(pharmacy.expire_reservations(later).unwrap(), 0);
    }

    #[test]
    fn listing_is_scoped_to_the_appointment() {
        let fx = Fixture::new();
        let mine = fx.appointment();
        let theirs = fx.appointment();
        let drug = fx.drug("Amoxicillin", 10);
        let pharmacy = service(&fx);
        pharmacy
            .prescribe(mine, &request(drug, 1, true), &fx.doctor())
            .unwrap();
        assert_eq!(pharmacy.list(mine).unwrap().prescriptions.len(), 1);
        assert!(pharmacy.list(theirs).unwrap().prescriptions.is_empty());
    }
}
