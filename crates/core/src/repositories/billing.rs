//! Billing accounts, discounts, payments and the revenue dashboard.
//!
//! Amounts are integer cents. `balance_cents = total_cents - discount_cents - paid_cents` holds
//! after every operation; an account closes when its balance reaches zero.

use crate::db::{fmt_datetime, now, parse_datetime, Database};
use crate::error::text_field;
use crate::constants::APPROVER_LEADERBOARD_SIZE;
use crate::models::{BillingStatus, PaymentMethod, User};
use crate::repositories::encounters::{complete_encounter, get_encounter};
use crate::repositories::master_data::ensure_branch;
use crate::{HmsError, HmsResult};
use api_shared::dto;
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const ACCOUNT_COLUMNS: &str = "id, patient_id, encounter_id, branch_id, invoice_number,
    total_cents, paid_cents, balance_cents, discount_cents, discount_reason,
    discount_approved_by, status, created_at";

fn row_to_account(row: &rusqlite::Row<'_>) -> Result<dto::BillingAccountRes, rusqlite::Error> {
    Ok(dto::BillingAccountRes {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        encounter_id: row.get(2)?,
        branch_id: row.get(3)?,
        invoice_number: row.get(4)?,
        total_cents: row.get(5)?,
        paid_cents: row.get(6)?,
        balance_cents: row.get(7)?,
        discount_cents: row.get(8)?,
        discount_reason: row.get(9)?,
        discount_approved_by: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
    })
}

pub fn get_account(conn: &Connection, id: i64) -> HmsResult<dto::BillingAccountRes> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM billing_accounts WHERE id = ?1"),
        params![id],
        row_to_account,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("billing account", id))
}

fn open_account(conn: &Connection, id: i64) -> HmsResult<dto::BillingAccountRes> {
    let account = get_account(conn, id)?;
    if account.status != BillingStatus::Open.as_str() {
        return Err(HmsError::Conflict(format!(
            "billing account {id} is {}",
            account.status
        )));
    }
    Ok(account)
}

fn positive_amount(amount_cents: i64) -> HmsResult<i64> {
    if amount_cents <= 0 {
        return Err(HmsError::validation("amount_cents", "must be positive"));
    }
    Ok(amount_cents)
}

/// Closes the account once nothing is owed.
fn close_if_settled(conn: &Connection, id: i64) -> HmsResult<()> {
    conn.execute(
        "UPDATE billing_accounts SET status = ?1
         WHERE id = ?2 AND status = ?3 AND balance_cents = 0 AND total_cents > 0",
        params![BillingStatus::Closed.as_str(), id, BillingStatus::Open.as_str()],
    )?;
    Ok(())
}

/// `INV-YYYYMMDD-NNNNNN`, dated by account creation and numbered by account id.
pub fn invoice_number(created_at: &NaiveDateTime, account_id: i64) -> String {
    format!("INV-{}-{:06}", created_at.format("%Y%m%d"), account_id)
}

/// Assigns invoice numbers to accounts that lack one. Returns how many were numbered.
pub fn backfill_invoice_numbers(conn: &Connection) -> HmsResult<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at FROM billing_accounts WHERE invoice_number IS NULL ORDER BY id",
    )?;
    let pending = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut numbered = 0;
    for (id, created_at) in pending {
        let created_at = match parse_datetime(&created_at) {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!(account_id = id, error = %e, "skipping account with unreadable created_at");
                continue;
            }
        };
        conn.execute(
            "UPDATE billing_accounts SET invoice_number = ?1 WHERE id = ?2",
            params![invoice_number(&created_at, id), id],
        )?;
        numbered += 1;
    }
    Ok(numbered)
}

/// Percentage change from `previous` to `current`, two decimals; exactly 0 when `previous` is 0.
pub fn growth_rate(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    let rate = (current - previous) as f64 / previous as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Optional branch and date window for the dashboard. Dates are inclusive.
#[derive(Debug, Clone, Default)]
pub struct DashboardFilter {
    pub branch_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn month_start(date: NaiveDate) -> HmsResult<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .ok_or_else(|| HmsError::InvalidInput(format!("no month start for {date}")))
}

fn shift_months(date: NaiveDate, forward: bool) -> HmsResult<NaiveDate> {
    let shifted = if forward {
        date.checked_add_months(Months::new(1))
    } else {
        date.checked_sub_months(Months::new(1))
    };
    shifted.ok_or_else(|| HmsError::InvalidInput(format!("date out of range: {date}")))
}

fn next_day(date: NaiveDate) -> HmsResult<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| HmsError::InvalidInput(format!("date out of range: {date}")))
}

fn day_start(date: NaiveDate) -> String {
    format!("{} 00:00:00", date.format(crate::constants::DATE_FORMAT))
}

/// Half-open `[start, end)` timestamp range on whole days.
struct Window {
    start: String,
    end: String,
}

impl Window {
    fn days(first: NaiveDate, end_exclusive: NaiveDate) -> Self {
        Self {
            start: day_start(first),
            end: day_start(end_exclusive),
        }
    }
}

fn revenue(conn: &Connection, branch_id: Option<i64>, window: &Window) -> HmsResult<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(p.amount_cents), 0)
         FROM payments p
         JOIN billing_accounts b ON b.id = p.billing_account_id
         WHERE p.received_at >= ?1 AND p.received_at < ?2
           AND (?3 IS NULL OR b.branch_id = ?3)",
        params![window.start, window.end, branch_id],
        |row| row.get(0),
    )
    .map_err(HmsError::from)
}

fn discount_totals(
    conn: &Connection,
    branch_id: Option<i64>,
    window: &Window,
) -> HmsResult<(i64, i64)> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(d.amount_cents), 0)
         FROM billing_discounts d
         JOIN billing_accounts b ON b.id = d.billing_account_id
         WHERE d.approved_at >= ?1 AND d.approved_at < ?2
           AND (?3 IS NULL OR b.branch_id = ?3)",
        params![window.start, window.end, branch_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .map_err(HmsError::from)
}

/// Top approvers by discounted amount. Each approval counts once for the admin who granted it.
fn approver_leaderboard(
    conn: &Connection,
    branch_id: Option<i64>,
    window: &Window,
) -> HmsResult<Vec<dto::ApproverTotal>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, COUNT(d.id), SUM(d.amount_cents) AS total
         FROM billing_discounts d
         JOIN billing_accounts b ON b.id = d.billing_account_id
         JOIN users u ON u.id = d.approved_by
         WHERE d.approved_at >= ?1 AND d.approved_at < ?2
           AND (?3 IS NULL OR b.branch_id = ?3)
         GROUP BY u.id, u.name
         ORDER BY total DESC, u.id
         LIMIT ?4",
    )?;
    let rows = stmt.query_map(
        params![window.start, window.end, branch_id, APPROVER_LEADERBOARD_SIZE],
        |row| {
            Ok(dto::ApproverTotal {
                user_id: row.get(0)?,
                name: row.get(1)?,
                discount_count: row.get(2)?,
                discount_total_cents: row.get(3)?,
            })
        },
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
}

fn payment_methods(
    conn: &Connection,
    branch_id: Option<i64>,
    window: &Window,
) -> HmsResult<Vec<dto::PaymentMethodTotal>> {
    let mut stmt = conn.prepare(
        "SELECT p.method, COUNT(*), SUM(p.amount_cents) AS total
         FROM payments p
         JOIN billing_accounts b ON b.id = p.billing_account_id
         WHERE p.received_at >= ?1 AND p.received_at < ?2
           AND (?3 IS NULL OR b.branch_id = ?3)
         GROUP BY p.method
         ORDER BY total DESC, p.method",
    )?;
    let rows = stmt.query_map(params![window.start, window.end, branch_id], |row| {
        Ok(dto::PaymentMethodTotal {
            method: row.get(0)?,
            count: row.get(1)?,
            total_cents: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
}

/// Dashboard rollups as of `at`. Each figure is its own aggregate query.
pub fn dashboard(
    conn: &Connection,
    filter: &DashboardFilter,
    at: NaiveDateTime,
) -> HmsResult<dto::BillingDashboardRes> {
    let today = at.date();
    let this_month = month_start(today)?;
    let next_month = shift_months(this_month, true)?;
    let previous_month = shift_months(this_month, false)?;

    let from = filter.from.unwrap_or(this_month);
    let to = filter.to.unwrap_or(today);
    if from > to {
        return Err(HmsError::validation("from", "must not be after to"));
    }
    let window = Window::days(from, next_day(to)?);
    let branch = filter.branch_id;

    let today_revenue_cents = revenue(conn, branch, &Window::days(today, next_day(today)?))?;
    let month_revenue_cents = revenue(conn, branch, &Window::days(this_month, next_month))?;
    let previous_month_revenue_cents =
        revenue(conn, branch, &Window::days(previous_month, this_month))?;
    let window_revenue_cents = revenue(conn, branch, &window)?;
    let (discount_count, discount_total_cents) = discount_totals(conn, branch, &window)?;

    Ok(dto::BillingDashboardRes {
        branch_id: branch,
        window_from: from.format(crate::constants::DATE_FORMAT).to_string(),
        window_to: to.format(crate::constants::DATE_FORMAT).to_string(),
        today_revenue_cents,
        month_revenue_cents,
        previous_month_revenue_cents,
        month_growth_rate: growth_rate(month_revenue_cents, previous_month_revenue_cents),
        window_revenue_cents,
        discount_count,
        discount_total_cents,
        approver_leaderboard: approver_leaderboard(conn, branch, &window)?,
        payment_methods: payment_methods(conn, branch, &window)?,
    })
}

#[derive(Clone, Debug)]
pub struct BillingService {
    db: Database,
    default_branch: NonEmptyText,
}

impl BillingService {
    pub fn new(db: Database, default_branch: NonEmptyText) -> Self {
        Self { db, default_branch }
    }

    /// Opens the single billing account of an encounter.
    pub fn open(&self, req: &dto::OpenBillingAccountReq) -> HmsResult<dto::BillingAccountRes> {
        let account = self.db.with_transaction(|tx| {
            let encounter = get_encounter(tx, req.encounter_id).map_err(|e| match e {
                HmsError::NotFound { .. } => HmsError::validation(
                    "encounter_id",
                    format!("encounter {} does not exist", req.encounter_id),
                ),
                other => other,
            })?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM billing_accounts WHERE encounter_id = ?1",
                    params![encounter.id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Err(HmsError::Conflict(format!(
                    "encounter {} already has billing account {existing}",
                    encounter.id
                )));
            }
            let branch_id = match req.branch_id {
                Some(id) => {
                    let known: Option<i64> = tx
                        .query_row("SELECT id FROM branches WHERE id = ?1", params![id], |row| {
                            row.get(0)
                        })
                        .optional()?;
                    known.ok_or_else(|| {
                        HmsError::validation("branch_id", format!("branch {id} does not exist"))
                    })?
                }
                None => ensure_branch(tx, self.default_branch.as_str())?,
            };

            let created = now();
            tx.execute(
                "INSERT INTO billing_accounts (patient_id, encounter_id, branch_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    encounter.patient_id,
                    encounter.id,
                    branch_id,
                    BillingStatus::Open.as_str(),
                    fmt_datetime(&created),
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE billing_accounts SET invoice_number = ?1 WHERE id = ?2",
                params![invoice_number(&created, id), id],
            )?;
            get_account(tx, id)
        })?;
        tracing::info!(
            account_id = account.id,
            encounter_id = account.encounter_id,
            "billing account opened"
        );
        Ok(account)
    }

    pub fn get(&self, id: i64) -> HmsResult<dto::BillingAccountRes> {
        self.db.with_conn(|conn| get_account(conn, id))
    }

    pub fn add_charge(&self, id: i64, req: &dto::AddChargeReq) -> HmsResult<dto::BillingAccountRes> {
        let amount = positive_amount(req.amount_cents)?;
        let description = text_field("description", NonEmptyText::new(&req.description))?;
        self.db.with_transaction(|tx| {
            open_account(tx, id)?;
            tx.execute(
                "INSERT INTO billing_charges (billing_account_id, description, amount_cents, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, description.as_str(), amount, fmt_datetime(&now())],
            )?;
            tx.execute(
                "UPDATE billing_accounts
                 SET total_cents = total_cents + ?1, balance_cents = balance_cents + ?1
                 WHERE id = ?2",
                params![amount, id],
            )?;
            get_account(tx, id)
        })
    }

    /// Applies a discount approved by an administrator and records the approval.
    ///
    /// The discount cannot exceed the outstanding balance, which also bounds the cumulative
    /// discount by the account total.
    pub fn apply_discount(
        &self,
        id: i64,
        req: &dto::ApplyDiscountReq,
        approver: &User,
    ) -> HmsResult<dto::BillingAccountRes> {
        if !approver.is_admin() {
            return Err(HmsError::Forbidden(
                "discounts must be approved by an administrator".into(),
            ));
        }
        let amount = positive_amount(req.amount_cents)?;
        let reason = text_field("reason", NonEmptyText::new(&req.reason))?;

        let account = self.db.with_transaction(|tx| {
            let account = open_account(tx, id)?;
            if amount > account.balance_cents {
                return Err(HmsError::validation(
                    "amount_cents",
                    format!("discount exceeds the outstanding balance of {}", account.balance_cents),
                ));
            }
            let approved_at = fmt_datetime(&now());
            tx.execute(
                "INSERT INTO billing_discounts
                     (billing_account_id, amount_cents, reason, approved_by, approved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, amount, reason.as_str(), approver.id, approved_at],
            )?;
            // The account columns summarise the latest approval; rollups read billing_discounts.
            tx.execute(
                "UPDATE billing_accounts
                 SET discount_cents = discount_cents + ?1,
                     balance_cents = balance_cents - ?1,
                     discount_reason = ?2,
                     discount_approved_by = ?3,
                     discount_approved_at = ?4
                 WHERE id = ?5",
                params![amount, reason.as_str(), approver.id, approved_at, id],
            )?;
            close_if_settled(tx, id)?;
            get_account(tx, id)
        })?;
        tracing::info!(account_id = id, amount_cents = amount, approved_by = approver.id, "discount applied");
        Ok(account)
    }

    pub fn record_payment(
        &self,
        id: i64,
        req: &dto::RecordPaymentReq,
        received_by: &User,
    ) -> HmsResult<dto::PaymentRes> {
        let amount = positive_amount(req.amount_cents)?;
        let method = PaymentMethod::parse_field("method", &req.method)?;

        let payment = self.db.with_transaction(|tx| {
            let account = open_account(tx, id)?;
            if amount > account.balance_cents {
                return Err(HmsError::validation(
                    "amount_cents",
                    format!("payment exceeds the outstanding balance of {}", account.balance_cents),
                ));
            }
            tx.execute(
                "INSERT INTO payments (billing_account_id, amount_cents, method, received_by, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, amount, method.as_str(), received_by.id, fmt_datetime(&now())],
            )?;
            let payment_id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE billing_accounts
                 SET paid_cents = paid_cents + ?1, balance_cents = balance_cents - ?1
                 WHERE id = ?2",
                params![amount, id],
            )?;
            close_if_settled(tx, id)?;
            tx.query_row(
                "SELECT id, billing_account_id, amount_cents, method, received_by, received_at
                 FROM payments WHERE id = ?1",
                params![payment_id],
                |row| {
                    Ok(dto::PaymentRes {
                        id: row.get(0)?,
                        billing_account_id: row.get(1)?,
                        amount_cents: row.get(2)?,
                        method: row.get(3)?,
                        received_by: row.get(4)?,
                        received_at: row.get(5)?,
                    })
                },
            )
            .map_err(HmsError::from)
        })?;
        tracing::info!(account_id = id, amount_cents = amount, method = %method, "payment recorded");
        Ok(payment)
    }

    /// Discharges a settled account and completes its encounter.
    pub fn discharge(&self, id: i64) -> HmsResult<dto::BillingAccountRes> {
        let account = self.db.with_transaction(|tx| {
            let account = get_account(tx, id)?;
            if account.status == BillingStatus::Discharged.as_str() {
                return Err(HmsError::Conflict(format!("billing account {id} is already discharged")));
            }
            if account.balance_cents > 0 {
                return Err(HmsError::Conflict(format!(
                    "billing account {id} still owes {}",
                    account.balance_cents
                )));
            }
            tx.execute(
                "UPDATE billing_accounts SET status = ?1 WHERE id = ?2",
                params![BillingStatus::Discharged.as_str(), id],
            )?;
            complete_encounter(tx, account.encounter_id, now())?;
            get_account(tx, id)
        })?;
        tracing::info!(account_id = id, encounter_id = account.encounter_id, "patient discharged");
        Ok(account)
    }

    pub fn dashboard(&self, filter: &DashboardFilter) -> HmsResult<dto::BillingDashboardRes> {
        self.db.with_conn(|conn| dashboard(conn, filter, now()))
    }

    pub fn backfill_invoices(&self) -> HmsResult<usize> {
        self.db.with_transaction(|tx| backfill_invoice_numbers(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    fn service(fx: &Fixture) -> BillingService {
        BillingService::new(fx.db.clone(), NonEmptyText::new("Main").unwrap())
    }

    fn account_with_charge(fx: &Fixture, svc: &BillingService, cents: i64) -> dto::BillingAccountRes {
        let account = svc
            .open(&dto::OpenBillingAccountReq {
                encounter_id: fx.opd_encounter(),
                branch_id: None,
            })
            .unwrap();
        svc.add_charge(
            account.id,
            &dto::AddChargeReq {
                description: "Consultation".into(),
                amount_cents: cents,
            },
        )
        .unwrap()
    }

    fn pay(svc: &BillingService, fx: &Fixture, id: i64, cents: i64, method: &str) {
        svc.record_payment(
            id,
            &dto::RecordPaymentReq {
                amount_cents: cents,
                method: method.into(),
            },
            &fx.cashier(),
        )
        .unwrap();
    }

    fn set_received_at(fx: &Fixture, at: &str) {
        fx.db
            .with_conn(|c| {
                c.execute("UPDATE payments SET received_at = ?1 WHERE received_at > ?1", params![at])?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn growth_rate_handles_zero_previous() {
        assert_eq!(growth_rate(500, 0), 0.0);
        assert_eq!(growth_rate(0, 0), 0.0);
        assert_eq!(growth_rate(150, 100), 50.0);
        assert_eq!(growth_rate(50, 100), -50.0);
        assert_eq!(growth_rate(1, 3), -66.67);
    }

    #[test]
    fn opening_assigns_default_branch_and_invoice() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let account = account_with_charge(&fx, &svc, 5_000);
        assert!(account.branch_id.is_some());
        assert!(account.invoice_number.as_deref().unwrap().starts_with("INV-"));
        assert_eq!(account.balance_cents, 5_000);

        let again = svc.open(&dto::OpenBillingAccountReq {
            encounter_id: account.encounter_id,
            branch_id: None,
        });
        assert!(matches!(again, Err(HmsError::Conflict(_))));
    }

    #[test]
    fn discounts_need_admin_and_cannot_exceed_balance() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let account = account_with_charge(&fx, &svc, 5_000);
        let req = dto::ApplyDiscountReq {
            amount_cents: 1_000,
            reason: "staff".into(),
        };
        let err = svc.apply_discount(account.id, &req, &fx.cashier()).unwrap_err();
        assert!(matches!(err, HmsError::Forbidden(_)));

        let too_much = dto::ApplyDiscountReq {
            amount_cents: 6_000,
            reason: "waiver".into(),
        };
        let err = svc.apply_discount(account.id, &too_much, &fx.admin()).unwrap_err();
        assert_eq!(err.field(), Some("amount_cents"));

        let discounted = svc.apply_discount(account.id, &req, &fx.admin()).unwrap();
        assert_eq!(discounted.balance_cents, 4_000);
        assert_eq!(discounted.discount_approved_by, Some(fx.admin_id));

        // Within the total but above what is still owed after a payment.
        pay(&svc, &fx, account.id, 3_500, "cash");
        let err = svc.apply_discount(account.id, &req, &fx.admin()).unwrap_err();
        assert_eq!(err.field(), Some("amount_cents"));
        assert_eq!(svc.get(account.id).unwrap().balance_cents, 500);
    }

    #[test]
    fn payments_close_the_account_at_zero() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let account = account_with_charge(&fx, &svc, 3_000);
        pay(&svc, &fx, account.id, 1_000, "cash");
        let err = svc
            .record_payment(
                account.id,
                &dto::RecordPaymentReq {
                    amount_cents: 5_000,
                    method: "card".into(),
                },
                &fx.cashier(),
            )
            .unwrap_err();
        assert_eq!(err.field(), Some("amount_cents"));

        pay(&svc, &fx, account.id, 2_000, "mobile_money");
        let settled = svc.get(account.id).unwrap();
        assert_eq!(settled.status, "closed");
        assert_eq!(settled.paid_cents, 3_000);

        let discharged = svc.discharge(account.id).unwrap();
        assert_eq!(discharged.status, "discharged");
    }

    #[test]
    fn discharge_refuses_outstanding_balance() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let account = account_with_charge(&fx, &svc, 3_000);
        assert!(matches!(svc.discharge(account.id), Err(HmsError::Conflict(_))));
    }

    #[test]
    fn dashboard_rolls_up_revenue_discounts_and_methods() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let a = account_with_charge(&fx, &svc, 10_000);
        let b = account_with_charge(&fx, &svc, 10_000);
        pay(&svc, &fx, a.id, 4_000, "cash");
        pay(&svc, &fx, b.id, 1_000, "card");
        // Move the first two payments into the previous month.
        set_received_at(&fx, "2024-04-15 10:00:00");
        pay(&svc, &fx, a.id, 6_000, "cash");
        set_received_at(&fx, "2024-05-10 10:00:00");
        svc.apply_discount(
            b.id,
            &dto::ApplyDiscountReq {
                amount_cents: 500,
                reason: "hardship".into(),
            },
            &fx.admin(),
        )
        .unwrap();
        fx.db
            .with_conn(|c| {
                c.execute("UPDATE billing_discounts SET approved_at = '2024-05-11 09:00:00'", [])?;
                Ok(())
            })
            .unwrap();

        let at = parse_datetime("2024-05-20 12:00:00").unwrap();
        let res = fx
            .db
            .with_conn(|c| dashboard(c, &DashboardFilter::default(), at))
            .unwrap();
        assert_eq!(res.window_from, "2024-05-01");
        assert_eq!(res.window_to, "2024-05-20");
        assert_eq!(res.today_revenue_cents, 0);
        assert_eq!(res.month_revenue_cents, 6_000);
        assert_eq!(res.previous_month_revenue_cents, 5_000);
        assert_eq!(res.month_growth_rate, 20.0);
        assert_eq!(res.discount_count, 1);
        assert_eq!(res.discount_total_cents, 500);
        assert_eq!(res.approver_leaderboard.len(), 1);
        assert_eq!(res.approver_leaderboard[0].user_id, fx.admin_id);
        assert_eq!(res.payment_methods.len(), 1);
        assert_eq!(res.payment_methods[0].method, "cash");

        let april = fx
            .db
            .with_conn(|c| {
                dashboard(
                    c,
                    &DashboardFilter {
                        from: NaiveDate::from_ymd_opt(2024, 4, 1),
                        to: NaiveDate::from_ymd_opt(2024, 4, 30),
                        branch_id: a.branch_id,
                    },
                    at,
                )
            })
            .unwrap();
        assert_eq!(april.window_revenue_cents, 5_000);
        assert_eq!(april.payment_methods.len(), 2);
    }

    #[test]
    fn leaderboard_credits_each_approver_for_their_own_discount() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let second_admin =
            fx.add_user("Second Admin", "admin2@example.org", crate::UserRole::Admin);
        let account = account_with_charge(&fx, &svc, 10_000);
        let discount = |cents: i64, approver: &User| {
            svc.apply_discount(
                account.id,
                &dto::ApplyDiscountReq {
                    amount_cents: cents,
                    reason: "hardship".into(),
                },
                approver,
            )
            .unwrap()
        };
        discount(3_000, &fx.admin());
        let after = discount(500, &second_admin);
        assert_eq!(after.discount_cents, 3_500);
        assert_eq!(after.balance_cents, 6_500);

        let res = svc.dashboard(&DashboardFilter::default()).unwrap();
        assert_eq!(res.discount_count, 2);
        assert_eq!(res.discount_total_cents, 3_500);
        let board: Vec<(i64, i64, i64)> = res
            .approver_leaderboard
            .iter()
            .map(|a| (a.user_id, a.discount_count, a.discount_total_cents))
            .collect();
        assert_eq!(board, vec![(fx.admin_id, 1, 3_000), (second_admin.id, 1, 500)]);
    }

    #[test]
    fn discount_window_follows_each_approval_date() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let account = account_with_charge(&fx, &svc, 10_000);
        let req = dto::ApplyDiscountReq {
            amount_cents: 1_000,
            reason: "staff".into(),
        };
        svc.apply_discount(account.id, &req, &fx.admin()).unwrap();
        fx.db
            .with_conn(|c| {
                c.execute("UPDATE billing_discounts SET approved_at = '2024-04-10 09:00:00'", [])?;
                Ok(())
            })
            .unwrap();
        svc.apply_discount(account.id, &req, &fx.admin()).unwrap();
        fx.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE billing_discounts SET approved_at = '2024-05-10 09:00:00'
                     WHERE approved_at > '2024-05-10 09:00:00'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let at = parse_datetime("2024-05-20 12:00:00").unwrap();
        let may = fx
            .db
            .with_conn(|c| dashboard(c, &DashboardFilter::default(), at))
            .unwrap();
        assert_eq!((may.discount_count, may.discount_total_cents), (1, 1_000));
    }

    #[test]
    fn dashboard_with_no_history_reports_zero_growth() {
        let fx = Fixture::new();
        let res = service(&fx).dashboard(&DashboardFilter::default()).unwrap();
        assert_eq!(res.month_growth_rate, 0.0);
        assert!(res.approver_leaderboard.is_empty());
    }

    #[test]
    fn dashboard_rejects_inverted_window() {
        let fx = Fixture::new();
        let err = service(&fx)
            .dashboard(&DashboardFilter {
                from: NaiveDate::from_ymd_opt(2024, 5, 2),
                to: NaiveDate::from_ymd_opt(2024, 5, 1),
                branch_id: None,
            })
            .unwrap_err();
        assert_eq!(err.field(), Some("from"));
    }

    #[test]
    fn backfill_numbers_only_missing_invoices() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let account = account_with_charge(&fx, &svc, 1_000);
        fx.db
            .with_conn(|c| {
                c.execute(
                    "UPDATE billing_accounts SET invoice_number = NULL, created_at = '2024-02-29 08:00:00'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        assert_eq!(svc.backfill_invoices().unwrap(), 1);
        assert_eq!(svc.backfill_invoices().unwrap(), 0);
        assert_eq!(
            svc.get(account.id).unwrap().invoice_number.as_deref(),
            Some(format!("INV-20240229-{:06}", account.id).as_str())
        );
    }
}
