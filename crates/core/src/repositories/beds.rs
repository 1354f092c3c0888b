//! Bed assignment, occupancy and reconciliation.
//!
//! The `beds.status` column is a denormalised cache. Occupancy reads go through the
//! `bed_occupancy` view, which derives the effective status from active assignments on ACTIVE
//! IPD encounters; [`reconcile_bed_status`] repairs the column to match.

use crate::cache::CacheService;
use crate::constants::CACHE_KEY_BED_OCCUPANCY;
use crate::db::{fmt_datetime, now, Database};
use crate::models::{BedStatus, EncounterStatus, EncounterType};
use crate::repositories::encounters::get_encounter;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// SQL predicate for "encounter `e` holds a bed legitimately".
const ACTIVE_IPD: &str = "e.encounter_type = 'IPD' AND e.status = 'ACTIVE'";

fn row_to_assignment(row: &rusqlite::Row<'_>) -> Result<dto::BedAssignmentRes, rusqlite::Error> {
    Ok(dto::BedAssignmentRes {
        id: row.get(0)?,
        bed_id: row.get(1)?,
        encounter_id: row.get(2)?,
        assigned_at: row.get(3)?,
        released_at: row.get(4)?,
    })
}

pub fn get_assignment(conn: &Connection, id: i64) -> HmsResult<dto::BedAssignmentRes> {
    conn.query_row(
        "SELECT id, bed_id, encounter_id, assigned_at, released_at
         FROM bed_assignments WHERE id = ?1",
        params![id],
        row_to_assignment,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("bed assignment", id))
}

fn effective_status(conn: &Connection, bed_id: i64) -> HmsResult<BedStatus> {
    let status: Option<String> = conn
        .query_row(
            "SELECT effective_status FROM bed_occupancy WHERE bed_id = ?1",
            params![bed_id],
            |row| row.get(0),
        )
        .optional()?;
    status
        .ok_or_else(|| HmsError::not_found("bed", bed_id))?
        .parse()
}

/// Counts per status, with every status present (zero counts included).
fn distribution(conn: &Connection, sql: &str) -> HmsResult<Vec<dto::StatusCount>> {
    let mut stmt = conn.prepare(sql)?;
    let counts = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(BedStatus::ALL
        .iter()
        .map(|status| dto::StatusCount {
            status: status.to_string(),
            count: counts.get(status.as_str()).copied().unwrap_or(0),
        })
        .collect())
}

pub fn stored_distribution(conn: &Connection) -> HmsResult<Vec<dto::StatusCount>> {
    distribution(conn, "SELECT status, COUNT(*) FROM beds GROUP BY status")
}

pub fn effective_distribution(conn: &Connection) -> HmsResult<Vec<dto::StatusCount>> {
    distribution(
        conn,
        "SELECT effective_status, COUNT(*) FROM bed_occupancy GROUP BY effective_status",
    )
}

/// Occupancy totals by effective status and per active ward.
pub fn occupancy_summary(conn: &Connection) -> HmsResult<dto::BedOccupancyRes> {
    let by_status = effective_distribution(conn)?;
    let total = by_status.iter().map(|s| s.count).sum();

    let mut stmt = conn.prepare(
        "SELECT w.id, w.name,
            COUNT(o.bed_id),
            COALESCE(SUM(o.effective_status = 'occupied'), 0),
            COALESCE(SUM(o.effective_status = 'available'), 0)
         FROM wards w
         LEFT JOIN bed_occupancy o ON o.ward_id = w.id
         WHERE w.active = 1
         GROUP BY w.id, w.name
         ORDER BY w.name COLLATE NOCASE, w.id",
    )?;
    let wards = stmt
        .query_map([], |row| {
            let total: i64 = row.get(2)?;
            let occupied: i64 = row.get(3)?;
            Ok(dto::WardOccupancy {
                ward_id: row.get(0)?,
                ward_name: row.get(1)?,
                total,
                occupied,
                available: row.get(4)?,
                occupancy_rate: occupancy_rate(occupied, total),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dto::BedOccupancyRes {
        total,
        by_status,
        wards,
    })
}

/// Percentage of beds occupied, two decimals; 0 for a ward without beds.
pub fn occupancy_rate(occupied: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (occupied as f64 / total as f64 * 10_000.0).round() / 100.0
}

fn id_list(conn: &Connection, sql: &str) -> HmsResult<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Rebuilds `beds.status` from active assignments.
///
/// Occupied beds are reset to available, then every bed with an active assignment on an ACTIVE
/// IPD encounter is marked occupied.
///
/// This is not a full reset of every bed to available: maintenance, reserved and out-of-order
/// beds without an active assignment keep their administrative state, since no assignment
/// records it. Run it inside a transaction.
pub fn reconcile_bed_status(conn: &Connection) -> HmsResult<dto::ReconcileRes> {
    let before = stored_distribution(conn)?;
    let beds_changed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bed_occupancy WHERE stored_status != effective_status",
        [],
        |row| row.get(0),
    )?;

    conn.execute(
        "UPDATE beds SET status = ?1 WHERE status = ?2",
        params![BedStatus::Available.as_str(), BedStatus::Occupied.as_str()],
    )?;
    conn.execute(
        &format!(
            "UPDATE beds SET status = ?1
             WHERE id IN (
                SELECT ba.bed_id FROM bed_assignments ba
                JOIN encounters e ON e.id = ba.encounter_id
                WHERE ba.released_at IS NULL AND {ACTIVE_IPD}
             )"
        ),
        params![BedStatus::Occupied.as_str()],
    )?;

    let after = stored_distribution(conn)?;
    let unassigned_encounters = id_list(
        conn,
        &format!(
            "SELECT e.id FROM encounters e
             WHERE {ACTIVE_IPD}
               AND NOT EXISTS (
                 SELECT 1 FROM bed_assignments ba
                 WHERE ba.encounter_id = e.id AND ba.released_at IS NULL
               )
             ORDER BY e.id"
        ),
    )?;
    let multiply_assigned_encounters = id_list(
        conn,
        &format!(
            "SELECT e.id FROM encounters e
             JOIN bed_assignments ba ON ba.encounter_id = e.id AND ba.released_at IS NULL
             WHERE {ACTIVE_IPD}
             GROUP BY e.id
             HAVING COUNT(ba.id) > 1
             ORDER BY e.id"
        ),
    )?;
    let stale_assignments = id_list(
        conn,
        &format!(
            "SELECT ba.id FROM bed_assignments ba
             JOIN encounters e ON e.id = ba.encounter_id
             WHERE ba.released_at IS NULL AND NOT ({ACTIVE_IPD})
             ORDER BY ba.id"
        ),
    )?;

    Ok(dto::ReconcileRes {
        before,
        after,
        beds_changed,
        unassigned_encounters,
        multiply_assigned_encounters,
        stale_assignments,
    })
}

fn active_assignment_for_encounter(conn: &Connection, encounter_id: i64) -> HmsResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM bed_assignments WHERE encounter_id = ?1 AND released_at IS NULL",
        params![encounter_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(HmsError::from)
}

fn insert_assignment(conn: &Connection, bed_id: i64, encounter_id: i64) -> HmsResult<i64> {
    let encounter = get_encounter(conn, encounter_id).map_err(|e| match e {
        HmsError::NotFound { .. } => {
            HmsError::validation("encounter_id", format!("encounter {encounter_id} does not exist"))
        }
        other => other,
    })?;
    if encounter.encounter_type != EncounterType::Ipd || encounter.status != EncounterStatus::Active {
        return Err(HmsError::validation(
            "encounter_id",
            "only active IPD encounters can hold a bed",
        ));
    }
    if active_assignment_for_encounter(conn, encounter_id)?.is_some() {
        return Err(HmsError::Conflict(format!(
            "encounter {encounter_id} already holds a bed"
        )));
    }
    let status = effective_status(conn, bed_id)?;
    if status != BedStatus::Available {
        return Err(HmsError::Conflict(format!("bed {bed_id} is {status}")));
    }

    conn.execute(
        "INSERT INTO bed_assignments (bed_id, encounter_id, assigned_at) VALUES (?1, ?2, ?3)",
        params![bed_id, encounter_id, fmt_datetime(&now())],
    )?;
    let assignment_id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE beds SET status = ?1 WHERE id = ?2",
        params![BedStatus::Occupied.as_str(), bed_id],
    )?;
    Ok(assignment_id)
}

fn release_assignment(conn: &Connection, assignment_id: i64) -> HmsResult<dto::BedAssignmentRes> {
    let assignment = get_assignment(conn, assignment_id)?;
    if assignment.released_at.is_some() {
        return Err(HmsError::Conflict(format!(
            "bed assignment {assignment_id} was already released"
        )));
    }
    conn.execute(
        "UPDATE bed_assignments SET released_at = ?1 WHERE id = ?2",
        params![fmt_datetime(&now()), assignment_id],
    )?;
    conn.execute(
        "UPDATE beds SET status = ?1
         WHERE id = ?2 AND status = ?3
           AND NOT EXISTS (
             SELECT 1 FROM bed_assignments WHERE bed_id = ?2 AND released_at IS NULL
           )",
        params![
            BedStatus::Available.as_str(),
            assignment.bed_id,
            BedStatus::Occupied.as_str()
        ],
    )?;
    get_assignment(conn, assignment_id)
}

#[derive(Clone, Debug)]
pub struct BedService {
    db: Database,
    cache: CacheService,
}

impl BedService {
    pub fn new(db: Database, cache: CacheService) -> Self {
        Self { db, cache }
    }

    pub fn assign(&self, bed_id: i64, req: &dto::AssignBedReq) -> HmsResult<dto::BedAssignmentRes> {
        let assignment = self.db.with_transaction(|tx| {
            let id = insert_assignment(tx, bed_id, req.encounter_id)?;
            get_assignment(tx, id)
        })?;
        tracing::info!(bed_id, encounter_id = req.encounter_id, "bed assigned");
        self.invalidate_occupancy()?;
        Ok(assignment)
    }

    pub fn release(&self, assignment_id: i64) -> HmsResult<dto::BedAssignmentRes> {
        let released = self
            .db
            .with_transaction(|tx| release_assignment(tx, assignment_id))?;
        tracing::info!(assignment_id, bed_id = released.bed_id, "bed released");
        self.invalidate_occupancy()?;
        Ok(released)
    }

    /// Moves the encounter of `assignment_id` to another bed, returning the new assignment.
    pub fn transfer(
        &self,
        assignment_id: i64,
        req: &dto::TransferBedReq,
    ) -> HmsResult<dto::BedAssignmentRes> {
        let moved = self.db.with_transaction(|tx| {
            let old = release_assignment(tx, assignment_id)?;
            let id = insert_assignment(tx, req.bed_id, old.encounter_id)?;
            get_assignment(tx, id)
        })?;
        tracing::info!(
            from_assignment = assignment_id,
            to_bed = moved.bed_id,
            encounter_id = moved.encounter_id,
            "bed transferred"
        );
        self.invalidate_occupancy()?;
        Ok(moved)
    }

    /// Occupancy dashboard aggregate, served through the cache.
    pub fn occupancy(&self) -> HmsResult<dto::BedOccupancyRes> {
        self.cache.remember(CACHE_KEY_BED_OCCUPANCY, occupancy_summary)
    }

    pub fn reconcile(&self) -> HmsResult<dto::ReconcileRes> {
        let report = self.db.with_transaction(|tx| reconcile_bed_status(tx))?;
        tracing::info!(
            beds_changed = report.beds_changed,
            unassigned = report.unassigned_encounters.len(),
            multiply_assigned = report.multiply_assigned_encounters.len(),
            stale = report.stale_assignments.len(),
            "bed status reconciled"
        );
        if !report.stale_assignments.is_empty() {
            tracing::warn!(assignments = ?report.stale_assignments, "active bed assignments on closed or non-IPD encounters");
        }
        self.invalidate_occupancy()?;
        Ok(report)
    }

    fn invalidate_occupancy(&self) -> HmsResult<()> {
        self.cache.forget(CACHE_KEY_BED_OCCUPANCY).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    fn service(fx: &Fixture) -> BedService {
        BedService::new(fx.db.clone(), fx.cache())
    }

    fn set_stored(fx: &Fixture, bed_id: i64, status: BedStatus) {
        fx.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE beds SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), bed_id],
                )?;
                Ok(())
            })
            .unwrap();
    }

    fn count(dist: &[dto::StatusCount], status: BedStatus) -> i64 {
        dist.iter()
            .find(|s| s.status == status.as_str())
            .map(|s| s.count)
            .unwrap()
    }

    #[test]
    fn assign_marks_bed_occupied() {
        let fx = Fixture::new();
        let beds = service(&fx);
        let bed = fx.bed("A1");
        let encounter = fx.ipd_encounter();

        let assignment = beds.assign(bed, &dto::AssignBedReq { encounter_id: encounter }).unwrap();
        assert_eq!(assignment.bed_id, bed);
        let summary = fx.db.with_conn(occupancy_summary).unwrap();
        assert_eq!(count(&summary.by_status, BedStatus::Occupied), 1);
        assert_eq!(summary.wards[0].occupancy_rate, 100.0);
    }

    #[test]
    fn assign_rejects_opd_and_double_booking() {
        let fx = Fixture::new();
        let beds = service(&fx);
        let bed = fx.bed("A1");
        let other_bed = fx.bed("A2");
        let opd = fx.opd_encounter();
        let err = beds.assign(bed, &dto::AssignBedReq { encounter_id: opd }).unwrap_err();
        assert_eq!(err.field(), Some("encounter_id"));

        let first = fx.ipd_encounter();
        let second = fx.ipd_encounter();
        beds.assign(bed, &dto::AssignBedReq { encounter_id: first }).unwrap();
        let taken = beds.assign(bed, &dto::AssignBedReq { encounter_id: second }).unwrap_err();
        assert!(matches!(taken, HmsError::Conflict(_)));
        let twice = beds
            .assign(other_bed, &dto::AssignBedReq { encounter_id: first })
            .unwrap_err();
        assert!(matches!(twice, HmsError::Conflict(_)));
    }

    #[test]
    fn maintenance_bed_cannot_be_assigned() {
        let fx = Fixture::new();
        let bed = fx.bed("A1");
        set_stored(&fx, bed, BedStatus::Maintenance);
        let err = service(&fx)
            .assign(bed, &dto::AssignBedReq { encounter_id: fx.ipd_encounter() })
            .unwrap_err();
        assert!(matches!(err, HmsError::Conflict(_)));
    }

    #[test]
    fn release_and_transfer_move_occupancy() {
        let fx = Fixture::new();
        let beds = service(&fx);
        let a = fx.bed("A1");
        let b = fx.bed("A2");
        let encounter = fx.ipd_encounter();
        let first = beds.assign(a, &dto::AssignBedReq { encounter_id: encounter }).unwrap();

        let moved = beds.transfer(first.id, &dto::TransferBedReq { bed_id: b }).unwrap();
        assert_eq!(moved.bed_id, b);
        assert_eq!(moved.encounter_id, encounter);
        let stored = fx.db.with_conn(stored_distribution).unwrap();
        assert_eq!(count(&stored, BedStatus::Occupied), 1);

        beds.release(moved.id).unwrap();
        let again = beds.release(moved.id).unwrap_err();
        assert!(matches!(again, HmsError::Conflict(_)));
        let stored = fx.db.with_conn(stored_distribution).unwrap();
        assert_eq!(count(&stored, BedStatus::Available), 2);
    }

    #[test]
    fn reconcile_repairs_drift_and_keeps_admin_states() {
        let fx = Fixture::new();
        let beds = service(&fx);
        let held = fx.bed("A1");
        let phantom = fx.bed("A2");
        let repair = fx.bed("A3");
        let encounter = fx.ipd_encounter();
        beds.assign(held, &dto::AssignBedReq { encounter_id: encounter }).unwrap();

        set_stored(&fx, held, BedStatus::Available);
        set_stored(&fx, phantom, BedStatus::Occupied);
        set_stored(&fx, repair, BedStatus::Maintenance);

        let report = beds.reconcile().unwrap();
        assert_eq!(report.beds_changed, 2);
        assert_eq!(count(&report.before, BedStatus::Occupied), 1);
        assert_eq!(count(&report.after, BedStatus::Occupied), 1);
        assert_eq!(count(&report.after, BedStatus::Maintenance), 1);
        assert_eq!(count(&report.after, BedStatus::OutOfOrder), 0);
        assert_eq!(report.after.len(), BedStatus::ALL.len());

        let effective = fx.db.with_conn(effective_status_of(held)).unwrap();
        assert_eq!(effective, BedStatus::Occupied);
    }

    fn effective_status_of(bed_id: i64) -> impl FnOnce(&Connection) -> HmsResult<BedStatus> {
        move |c| effective_status(c, bed_id)
    }

    #[test]
    fn reconcile_is_idempotent() {
        let fx = Fixture::new();
        let beds = service(&fx);
        let bed = fx.bed("A1");
        fx.bed("A2");
        beds.assign(bed, &dto::AssignBedReq { encounter_id: fx.ipd_encounter() })
            .unwrap();
        set_stored(&fx, bed, BedStatus::Available);

        let first = beds.reconcile().unwrap();
        let second = beds.reconcile().unwrap();
        assert_eq!(first.after, second.after);
        assert_eq!(second.before, second.after);
        assert_eq!(second.beds_changed, 0);
    }

    #[test]
    fn reconcile_reports_orphans_and_stale_assignments() {
        let fx = Fixture::new();
        let beds = service(&fx);
        let bed = fx.bed("A1");
        let waiting = fx.ipd_encounter();
        let discharged = fx.ipd_encounter();
        let assignment = beds
            .assign(bed, &dto::AssignBedReq { encounter_id: discharged })
            .unwrap();
        // Close the encounter behind the assignment's back.
        fx.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE encounters SET status = 'COMPLETED' WHERE id = ?1",
                    params![discharged],
                )?;
                Ok(())
            })
            .unwrap();

        let report = beds.reconcile().unwrap();
        assert_eq!(report.unassigned_encounters, vec![waiting]);
        assert_eq!(report.stale_assignments, vec![assignment.id]);
        assert!(report.multiply_assigned_encounters.is_empty());
        assert_eq!(count(&report.after, BedStatus::Occupied), 0);
    }

    #[test]
    fn occupancy_rate_handles_empty_wards() {
        assert_eq!(occupancy_rate(0, 0), 0.0);
        assert_eq!(occupancy_rate(1, 3), 33.33);
    }
}
