//! Scheduled report definitions and their generated output.

use crate::db::{fmt_datetime, parse_datetime};
use crate::models::{ReportFrequency, ReportType};
use crate::repositories::beds::occupancy_summary;
use crate::repositories::billing::{dashboard, DashboardFilter};
use crate::{HmsError, HmsResult};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};

/// A due row from `report_schedules`. `report_type` is kept raw; unknown types fail at generation.
#[derive(Debug, Clone)]
pub struct ReportSchedule {
    pub id: i64,
    pub report_type: String,
    pub frequency: ReportFrequency,
    pub branch_id: Option<i64>,
    pub next_run_at: NaiveDateTime,
}

pub fn insert_schedule(
    conn: &Connection,
    report_type: &str,
    frequency: ReportFrequency,
    branch_id: Option<i64>,
    next_run_at: NaiveDateTime,
) -> HmsResult<i64> {
    conn.execute(
        "INSERT INTO report_schedules (report_type, frequency, branch_id, next_run_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![report_type, frequency.as_str(), branch_id, fmt_datetime(&next_run_at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn due_schedules(conn: &Connection, at: NaiveDateTime) -> HmsResult<Vec<ReportSchedule>> {
    let mut stmt = conn.prepare(
        "SELECT id, report_type, frequency, branch_id, next_run_at FROM report_schedules
         WHERE active = 1 AND next_run_at <= ?1
         ORDER BY next_run_at, id",
    )?;
    let rows = stmt
        .query_map(params![fmt_datetime(&at)], |row| {
            let frequency: String = row.get(2)?;
            let next_run_at: String = row.get(4)?;
            Ok(ReportSchedule {
                id: row.get(0)?,
                report_type: row.get(1)?,
                frequency: crate::models::enum_column(2, &frequency)?,
                branch_id: row.get(3)?,
                next_run_at: crate::models::datetime_column(4, &next_run_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The closed period a run at `at` reports on, as inclusive dates.
pub fn report_period(frequency: ReportFrequency, at: NaiveDateTime) -> HmsResult<(NaiveDate, NaiveDate)> {
    let today = at.date();
    let yesterday = today
        .pred_opt()
        .ok_or_else(|| HmsError::InvalidInput(format!("date out of range: {today}")))?;
    let start = match frequency {
        ReportFrequency::Daily => yesterday,
        ReportFrequency::Weekly => today - Duration::days(7),
        ReportFrequency::Monthly => {
            let first_of_month = today - Duration::days(i64::from(today.day0()));
            let start = first_of_month
                .checked_sub_months(Months::new(1))
                .ok_or_else(|| HmsError::InvalidInput(format!("date out of range: {today}")))?;
            return Ok((start, first_of_month.pred_opt().unwrap_or(start)));
        }
    };
    Ok((start, yesterday))
}

/// First run time strictly after `at`, stepping from the schedule's previous slot.
pub fn next_run_after(
    frequency: ReportFrequency,
    previous: NaiveDateTime,
    at: NaiveDateTime,
) -> HmsResult<NaiveDateTime> {
    let mut next = previous;
    while next <= at {
        next = match frequency {
            ReportFrequency::Daily => next + Duration::days(1),
            ReportFrequency::Weekly => next + Duration::days(7),
            ReportFrequency::Monthly => next
                .checked_add_months(Months::new(1))
                .ok_or_else(|| HmsError::InvalidInput(format!("date out of range: {next}")))?,
        };
    }
    Ok(next)
}

/// Builds the report for one schedule, stores it and advances the schedule.
pub fn generate_report(
    conn: &Connection,
    schedule: &ReportSchedule,
    at: NaiveDateTime,
) -> HmsResult<i64> {
    let report_type = ReportType::parse_field("report_type", &schedule.report_type)?;
    let (from, to) = report_period(schedule.frequency, at)?;
    let filter = DashboardFilter {
        branch_id: schedule.branch_id,
        from: Some(from),
        to: Some(to),
    };

    let payload = match report_type {
        ReportType::DailyRevenue => {
            let rollup = dashboard(conn, &filter, at)?;
            serde_json::json!({
                "revenue_cents": rollup.window_revenue_cents,
                "payment_methods": rollup.payment_methods,
            })
        }
        ReportType::BedOccupancy => {
            serde_json::to_value(occupancy_summary(conn)?).map_err(HmsError::Serialization)?
        }
        ReportType::DiscountSummary => {
            let rollup = dashboard(conn, &filter, at)?;
            serde_json::json!({
                "discount_count": rollup.discount_count,
                "discount_total_cents": rollup.discount_total_cents,
                "approver_leaderboard": rollup.approver_leaderboard,
            })
        }
    };

    let generated_at = fmt_datetime(&at);
    conn.execute(
        "INSERT INTO generated_reports
            (schedule_id, report_type, period_start, period_end, payload, generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            schedule.id,
            report_type.as_str(),
            from.to_string(),
            to.to_string(),
            payload.to_string(),
            generated_at,
        ],
    )?;
    let report_id = conn.last_insert_rowid();

    let next = next_run_after(schedule.frequency, schedule.next_run_at, at)?;
    conn.execute(
        "UPDATE report_schedules SET last_run_at = ?1, next_run_at = ?2 WHERE id = ?3",
        params![generated_at, fmt_datetime(&next), schedule.id],
    )?;
    Ok(report_id)
}

/// Generated report count for a schedule.
pub fn report_count(conn: &Connection, schedule_id: i64) -> HmsResult<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM generated_reports WHERE schedule_id = ?1",
        params![schedule_id],
        |row| row.get(0),
    )
    .map_err(HmsError::from)
}

pub fn next_run_of(conn: &Connection, schedule_id: i64) -> HmsResult<NaiveDateTime> {
    let raw: String = conn.query_row(
        "SELECT next_run_at FROM report_schedules WHERE id = ?1",
        params![schedule_id],
        |row| row.get(0),
    )?;
    parse_datetime(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn at(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn periods_cover_the_previous_interval() {
        let now = at("2024-03-15 06:00:00");
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(
            report_period(ReportFrequency::Daily, now).unwrap(),
            (day(2024, 3, 14), day(2024, 3, 14))
        );
        assert_eq!(
            report_period(ReportFrequency::Weekly, now).unwrap(),
            (day(2024, 3, 8), day(2024, 3, 14))
        );
        assert_eq!(
            report_period(ReportFrequency::Monthly, now).unwrap(),
            (day(2024, 2, 1), day(2024, 2, 29))
        );
    }

    #[test]
    fn next_run_skips_missed_slots() {
        let next = next_run_after(
            ReportFrequency::Daily,
            at("2024-03-10 06:00:00"),
            at("2024-03-15 07:00:00"),
        )
        .unwrap();
        assert_eq!(next, at("2024-03-16 06:00:00"));
    }

    #[test]
    fn generating_stores_payload_and_advances() {
        let db = Database::open_in_memory().unwrap();
        let now = at("2024-03-15 06:00:00");
        let (id, report) = db
            .with_transaction(|tx| {
                let id = insert_schedule(
                    tx,
                    "bed_occupancy",
                    ReportFrequency::Weekly,
                    None,
                    at("2024-03-15 05:00:00"),
                )?;
                let due = due_schedules(tx, now)?;
                assert_eq!(due.len(), 1);
                Ok((id, generate_report(tx, &due[0], now)?))
            })
            .unwrap();
        assert!(report > 0);
        let (count, next, due) = db
            .with_conn(|c| Ok((report_count(c, id)?, next_run_of(c, id)?, due_schedules(c, now)?)))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(next, at("2024-03-22 05:00:00"));
        assert!(due.is_empty());
    }

    #[test]
    fn unknown_report_type_fails_without_writing() {
        let db = Database::open_in_memory().unwrap();
        let now = at("2024-03-15 06:00:00");
        let err = db
            .with_transaction(|tx| {
                insert_schedule(tx, "weather", ReportFrequency::Daily, None, now)?;
                let due = due_schedules(tx, now)?;
                generate_report(tx, &due[0], now)
            })
            .unwrap_err();
        assert_eq!(err.field(), Some("report_type"));
    }
}
