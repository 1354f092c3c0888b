//! Lab orders, always addressed through the appointment (encounter) that owns them.

use crate::db::{fmt_datetime, now, Database};
use crate::error::text_field;
use crate::models::{enum_column, LabOrderPriority, LabOrderStatus};
use crate::repositories::appointments::get_appointment;
use crate::repositories::master_data::active_lab_test_name;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const LAB_ORDER_SELECT: &str = "SELECT lo.id, lo.patient_id, lo.encounter_id, lo.lab_test_id,
        lt.name, lo.priority, lo.status, lo.notes, lo.ordered_by, lo.created_at, lo.updated_at
    FROM lab_orders lo
    JOIN lab_tests lt ON lt.id = lo.lab_test_id";

fn row_to_lab_order(row: &rusqlite::Row<'_>) -> Result<dto::LabOrderRes, rusqlite::Error> {
    let priority: String = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(dto::LabOrderRes {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        encounter_id: row.get(2)?,
        lab_test_id: row.get(3)?,
        lab_test_name: row.get(4)?,
        priority: enum_column::<LabOrderPriority>(5, &priority)?.to_string(),
        status: enum_column::<LabOrderStatus>(6, &status)?.to_string(),
        notes: row.get(7)?,
        ordered_by: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Loads a lab order only if it belongs to `encounter_id`; otherwise it does not exist.
fn get_scoped(conn: &Connection, encounter_id: i64, order_id: i64) -> HmsResult<dto::LabOrderRes> {
    conn.query_row(
        &format!("{LAB_ORDER_SELECT} WHERE lo.id = ?1 AND lo.encounter_id = ?2"),
        params![order_id, encounter_id],
        row_to_lab_order,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("lab order", order_id))
}

fn require_lab_test(conn: &Connection, lab_test_id: i64) -> HmsResult<()> {
    match active_lab_test_name(conn, lab_test_id)? {
        Some(_) => Ok(()),
        None => Err(HmsError::validation(
            "lab_test_id",
            format!("lab test {lab_test_id} does not exist or is inactive"),
        )),
    }
}

#[derive(Clone, Debug)]
pub struct LabOrderService {
    db: Database,
}

impl LabOrderService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Orders a test for the appointment's patient; the order is linked to the appointment's
    /// encounter.
    pub fn create(
        &self,
        appointment_id: i64,
        req: &dto::CreateLabOrderReq,
        ordered_by: i64,
    ) -> HmsResult<dto::LabOrderRes> {
        let priority = match req.priority.as_deref() {
            Some(p) => LabOrderPriority::parse_field("priority", p)?,
            None => LabOrderPriority::Routine,
        };
        let notes = text_field("notes", NonEmptyText::optional(req.notes.as_deref()))?;

        let order = self.db.with_transaction(|tx| {
            let appointment = get_appointment(tx, appointment_id)?;
            require_lab_test(tx, req.lab_test_id)?;
            let at = fmt_datetime(&now());
            tx.execute(
                "INSERT INTO lab_orders
                    (patient_id, encounter_id, lab_test_id, priority, status, notes, ordered_by,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    appointment.patient_id,
                    appointment.encounter_id,
                    req.lab_test_id,
                    priority.as_str(),
                    LabOrderStatus::Ordered.as_str(),
                    notes.as_ref().map(NonEmptyText::as_str),
                    ordered_by,
                    at,
                ],
            )?;
            get_scoped(tx, appointment.encounter_id, tx.last_insert_rowid())
        })?;
        tracing::info!(
            lab_order_id = order.id,
            encounter_id = order.encounter_id,
            lab_test_id = order.lab_test_id,
            "lab order created"
        );
        Ok(order)
    }

    pub fn list(&self, appointment_id: i64) -> HmsResult<dto::ListLabOrdersRes> {
        let lab_orders = self.db.with_conn(|conn| {
            let appointment = get_appointment(conn, appointment_id)?;
            let mut stmt =
                conn.prepare(&format!("{LAB_ORDER_SELECT} WHERE lo.encounter_id = ?1 ORDER BY lo.id"))?;
            let rows = stmt.query_map(params![appointment.encounter_id], row_to_lab_order)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })?;
        Ok(dto::ListLabOrdersRes { lab_orders })
    }

    pub fn get(&self, appointment_id: i64, order_id: i64) -> HmsResult<dto::LabOrderRes> {
        self.db.with_conn(|conn| {
            let appointment = get_appointment(conn, appointment_id)?;
            get_scoped(conn, appointment.encounter_id, order_id)
        })
    }

    /// Applies a partial update. The owning encounter never changes.
    pub fn update(
        &self,
        appointment_id: i64,
        order_id: i64,
        req: &dto::UpdateLabOrderReq,
    ) -> HmsResult<dto::LabOrderRes> {
        let priority = req
            .priority
            .as_deref()
            .map(|p| LabOrderPriority::parse_field("priority", p))
            .transpose()?;
        let status = req
            .status
            .as_deref()
            .map(|s| LabOrderStatus::parse_field("status", s))
            .transpose()?;
        let notes = text_field("notes", NonEmptyText::optional(req.notes.as_deref()))?;

        self.db.with_transaction(|tx| {
            let appointment = get_appointment(tx, appointment_id)?;
            let existing = get_scoped(tx, appointment.encounter_id, order_id)?;
            if let Some(lab_test_id) = req.lab_test_id {
                require_lab_test(tx, lab_test_id)?;
            }
            tx.execute(
                "UPDATE lab_orders SET
                    lab_test_id = ?1, priority = ?2, status = ?3, notes = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    req.lab_test_id.unwrap_or(existing.lab_test_id),
                    priority.map_or(existing.priority.clone(), |p| p.to_string()),
                    status.map_or(existing.status.clone(), |s| s.to_string()),
                    notes.map(NonEmptyText::into_inner).or(existing.notes),
                    fmt_datetime(&now()),
                    order_id,
                ],
            )?;
            get_scoped(tx, appointment.encounter_id, order_id)
        })
    }

    pub fn delete(&self, appointment_id: i64, order_id: i64) -> HmsResult<()> {
        self.db.with_transaction(|tx| {
            let appointment = get_appointment(tx, appointment_id)?;
            get_scoped(tx, appointment.encounter_id, order_id)?;
            tx.execute("DELETE FROM lab_orders WHERE id = ?1", params![order_id])?;
            Ok(())
        })?;
        tracing::info!(lab_order_id = order_id, appointment_id, "lab order deleted");
        Ok(())
    }
}
