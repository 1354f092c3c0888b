//! Background maintenance jobs.
//!
//! Jobs are synchronous and idempotent. The `hms-run` scheduler calls [`run_all`] on an interval;
//! `hms jobs run <name>` runs one on demand.

use crate::cache::CacheService;
use crate::config::CoreConfig;
use crate::constants::CACHE_KEY_DRUGS;
use crate::db::Database;
use crate::repositories::billing::BillingService;
use crate::repositories::pharmacy::PharmacyService;
use crate::repositories::reports::{due_schedules, generate_report};
use crate::HmsResult;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Outcome of a single job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: &'static str,
    pub processed: usize,
    pub failed: usize,
}

pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn run(&self, at: NaiveDateTime) -> HmsResult<JobReport>;
}

/// Generates every due scheduled report. A failing schedule is logged and skipped.
pub struct ScheduledReportsJob {
    db: Database,
}

impl ScheduledReportsJob {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Job for ScheduledReportsJob {
    fn name(&self) -> &'static str {
        "scheduled-reports"
    }

    fn description(&self) -> &'static str {
        "Generate due revenue, occupancy and discount reports"
    }

    fn run(&self, at: NaiveDateTime) -> HmsResult<JobReport> {
        let due = self.db.with_conn(|conn| due_schedules(conn, at))?;
        let mut report = JobReport {
            job: self.name(),
            processed: 0,
            failed: 0,
        };
        for schedule in &due {
            match self
                .db
                .with_transaction(|tx| generate_report(tx, schedule, at))
            {
                Ok(report_id) => {
                    tracing::debug!(schedule_id = schedule.id, report_id, "report generated");
                    report.processed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        schedule_id = schedule.id,
                        report_type = %schedule.report_type,
                        error = %e,
                        "scheduled report failed"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Returns stock held by reservations that lapsed without being dispensed, then drops the cached
/// drug options so availability is recomputed.
pub struct ExpireStockReservationsJob {
    pharmacy: PharmacyService,
    cache: CacheService,
}

impl ExpireStockReservationsJob {
    pub fn new(pharmacy: PharmacyService, cache: CacheService) -> Self {
        Self { pharmacy, cache }
    }
}

impl Job for ExpireStockReservationsJob {
    fn name(&self) -> &'static str {
        "expire-stock-reservations"
    }

    fn description(&self) -> &'static str {
        "Release stock reservations past their reserved_until time"
    }

    fn run(&self, at: NaiveDateTime) -> HmsResult<JobReport> {
        let released = self.pharmacy.expire_reservations(at)?;
        if released > 0 {
            if let Err(e) = self.cache.forget(CACHE_KEY_DRUGS) {
                tracing::warn!(key = CACHE_KEY_DRUGS, error = %e, "failed to drop cached drug options");
            }
        }
        Ok(JobReport {
            job: self.name(),
            processed: released,
            failed: 0,
        })
    }
}

/// Numbers billing accounts that were created without an invoice number.
pub struct InvoiceBackfillJob {
    billing: BillingService,
}

impl InvoiceBackfillJob {
    pub fn new(billing: BillingService) -> Self {
        Self { billing }
    }
}

impl Job for InvoiceBackfillJob {
    fn name(&self) -> &'static str {
        "invoice-backfill"
    }

    fn description(&self) -> &'static str {
        "Assign INV-YYYYMMDD-NNNNNN numbers to accounts missing one"
    }

    fn run(&self, _at: NaiveDateTime) -> HmsResult<JobReport> {
        Ok(JobReport {
            job: self.name(),
            processed: self.billing.backfill_invoices()?,
            failed: 0,
        })
    }
}

pub fn default_jobs(db: &Database, cfg: &CoreConfig) -> Vec<Box<dyn Job>> {
    vec![
        Box::new(ScheduledReportsJob::new(db.clone())),
        Box::new(ExpireStockReservationsJob::new(
            PharmacyService::new(db.clone(), cfg.reservation_window()),
            CacheService::new(db.clone(), cfg.cache_ttl()),
        )),
        Box::new(InvoiceBackfillJob::new(BillingService::new(
            db.clone(),
            cfg.default_branch().clone(),
        ))),
    ]
}

pub fn find_job<'a>(jobs: &'a [Box<dyn Job>], name: &str) -> Option<&'a dyn Job> {
    jobs.iter().find(|j| j.name() == name).map(|j| j.as_ref())
}

/// Runs every job once. A job that errors is logged and reported as one failure.
pub fn run_all(jobs: &[Box<dyn Job>], at: NaiveDateTime) -> Vec<JobReport> {
    jobs.iter()
        .map(|job| match job.run(at) {
            Ok(report) => {
                if report.processed > 0 || report.failed > 0 {
                    tracing::info!(
                        job = report.job,
                        processed = report.processed,
                        failed = report.failed,
                        "job finished"
                    );
                }
                report
            }
            Err(e) => {
                tracing::error!(job = job.name(), error = %e, "job failed");
                JobReport {
                    job: job.name(),
                    processed: 0,
                    failed: 1,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now, parse_datetime};
    use crate::models::ReportFrequency;
    use crate::repositories::master_data::MasterDataService;
    use crate::repositories::reports::insert_schedule;
    use crate::test_support::Fixture;
    use std::path::PathBuf;

    fn config() -> CoreConfig {
        CoreConfig::new(PathBuf::from(":memory:"), "127.0.0.1:0".into(), 60, 30, 60, "Main")
            .unwrap()
    }

    #[test]
    fn job_names_are_unique_and_findable() {
        let fx = Fixture::new();
        let jobs = default_jobs(&fx.db, &config());
        for name in ["scheduled-reports", "expire-stock-reservations", "invoice-backfill"] {
            assert!(find_job(&jobs, name).is_some(), "{name}");
        }
        assert!(find_job(&jobs, "nope").is_none());
    }

    #[test]
    fn failing_schedule_does_not_stop_the_others() {
        let fx = Fixture::new();
        let at = parse_datetime("2024-03-15 06:00:00").unwrap();
        fx.db
            .with_conn(|c| {
                insert_schedule(c, "weather", ReportFrequency::Daily, None, at)?;
                insert_schedule(c, "daily_revenue", ReportFrequency::Daily, None, at)?;
                insert_schedule(c, "discount_summary", ReportFrequency::Monthly, None, at)?;
                Ok(())
            })
            .unwrap();

        let report = ScheduledReportsJob::new(fx.db.clone()).run(at).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);

        let again = ScheduledReportsJob::new(fx.db.clone()).run(at).unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.failed, 1);
    }

    #[test]
    fn expiring_reservations_refreshes_drug_options() {
        let fx = Fixture::new();
        let appointment = fx.appointment();
        let drug = fx.drug("Amoxicillin", 10);
        let pharmacy = PharmacyService::new(fx.db.clone(), chrono::Duration::minutes(60));
        pharmacy
            .prescribe(
                appointment,
                &api_shared::dto::CreatePrescriptionReq {
                    drug_id: drug,
                    dosage: "500mg".into(),
                    frequency: "tds".into(),
                    duration_days: 5,
                    quantity: 4,
                    instant_dispensing: false,
                },
                &fx.doctor(),
            )
            .unwrap();

        let master = MasterDataService::new(fx.db.clone(), fx.cache());
        assert_eq!(master.drugs().unwrap()[0].available_quantity, 6);

        let job = ExpireStockReservationsJob::new(pharmacy, fx.cache());
        let report = job.run(now() + chrono::Duration::minutes(61)).unwrap();
        assert_eq!(report.processed, 1);
        assert!(fx
            .cache()
            .get::<Vec<api_shared::dto::DrugOption>>(CACHE_KEY_DRUGS)
            .unwrap()
            .is_none());
        assert_eq!(master.drugs().unwrap()[0].available_quantity, 10);
    }

    #[test]
    fn run_all_reports_every_job() {
        let fx = Fixture::new();
        let jobs = default_jobs(&fx.db, &config());
        let reports = run_all(&jobs, now());
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.failed == 0));
    }
}
