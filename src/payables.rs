// 💳 Payables - debts and bills with partial-payment progress
//
// Applying a payment is the one read-modify-write in the system:
//
//   new_paid = paid_amount + payment        (must not exceed amount)
//   new_paid == amount  =>  settled, paid_date = now
//
// and every applied payment leaves exactly one "expense" ledger entry behind.
// The whole sequence runs in one IMMEDIATE transaction: two concurrent
// payments cannot both pass the balance check, and the payable update and
// ledger insert commit together or not at all.

use crate::auth::{require_owned, Owned};
use crate::db::{new_id, now, optional_time_column, time_column, timestamp, write_tx};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{record_entry, NewLedgerEntry};
use crate::models::{Flow, LedgerEntry, Notification, Payable, Priority};
use crate::money::{self, amount_column};
use crate::notifications::{create_notification, preferences_or_default, NewNotification};
use chrono::{Days, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewPayable {
    pub user_id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayableFilter {
    #[default]
    All,
    Open,
    Paid,
}

impl std::str::FromStr for PayableFilter {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PayableFilter::All),
            "open" | "unpaid" => Ok(PayableFilter::Open),
            "paid" => Ok(PayableFilter::Paid),
            other => Err(LedgerError::invalid(format!("unknown payable status '{}'", other))),
        }
    }
}

/// What the caller learns about the payment just applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_fully_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub payable: Payable,
    pub payment: PaymentSummary,
    #[serde(skip)]
    pub entry: LedgerEntry,
}

/// The validated state change for one payment, computed before any write.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPlan {
    pub amount: Decimal,
    pub new_paid: Decimal,
    pub settles: bool,
}

impl PaymentPlan {
    pub fn remaining_after(&self, total: Decimal) -> Decimal {
        money::to_cents((total - self.new_paid).max(Decimal::ZERO))
    }
}

// ============================================================================
// PAYMENT RULES
// ============================================================================

/// Decide whether `amount` can be applied to `payable`, and what it does.
///
/// `amount` must already be validated as a positive cent value.
pub fn plan_payment(payable: &Payable, amount: Decimal) -> LedgerResult<PaymentPlan> {
    if payable.is_paid {
        return Err(LedgerError::AlreadySettled);
    }

    let new_paid = match payable.paid_amount.checked_add(amount) {
        Some(sum) if sum <= payable.amount => sum,
        _ => {
            return Err(LedgerError::ExceedsRemaining {
                remaining: payable.remaining(),
            })
        }
    };

    let settles = new_paid >= payable.amount;
    Ok(PaymentPlan {
        amount,
        // Clamp so a settled payable holds exactly its total
        new_paid: if settles { payable.amount } else { new_paid },
        settles,
    })
}

fn payment_notes(payable: &Payable) -> String {
    match payable.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => {
            format!("Payment for {} - {}", payable.name, description)
        }
        _ => format!("Payment for {}", payable.name),
    }
}

// ============================================================================
// STORAGE
// ============================================================================

const PAYABLE_COLUMNS: &str = "id, user_id, name, category, description, amount, paid_amount, \
                               is_paid, due_date, paid_date, created_at, updated_at";

fn payable_from_row(row: &Row<'_>) -> rusqlite::Result<Payable> {
    Ok(Payable {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        amount: amount_column(row, 5)?,
        paid_amount: amount_column(row, 6)?,
        is_paid: row.get(7)?,
        due_date: row.get(8)?,
        paid_date: optional_time_column(row, 9)?,
        created_at: time_column(row, 10)?,
        updated_at: time_column(row, 11)?,
    })
}

pub fn create_payable(conn: &Connection, new: NewPayable) -> LedgerResult<Payable> {
    let name = new.name.trim();
    let category = new.category.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("name is required"));
    }
    if category.is_empty() {
        return Err(LedgerError::invalid("category is required"));
    }
    let amount = money::validate_positive(new.amount, "amount")?;

    let created_at = now();
    let payable = Payable {
        id: new_id(),
        user_id: new.user_id,
        name: name.to_string(),
        category: category.to_string(),
        description: new.description.filter(|d| !d.trim().is_empty()),
        amount,
        paid_amount: money::to_cents(Decimal::ZERO),
        is_paid: false,
        due_date: new.due_date,
        paid_date: None,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        "INSERT INTO payables (id, user_id, name, category, description, amount, paid_amount,
                               is_paid, due_date, paid_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, NULL, ?9, ?9)",
        params![
            payable.id,
            payable.user_id,
            payable.name,
            payable.category,
            payable.description,
            money::to_sql(payable.amount),
            money::to_sql(payable.paid_amount),
            payable.due_date,
            timestamp(created_at),
        ],
    )?;

    tracing::info!(payable_id = %payable.id, amount = %payable.amount, "payable created");
    Ok(payable)
}

/// Load a payable the caller owns.
pub fn get_payable(conn: &Connection, payable_id: &str, user_id: &str) -> LedgerResult<Payable> {
    require_owned(conn, Owned::Payable, payable_id, user_id)?;

    let sql = format!("SELECT {} FROM payables WHERE id = ?1", PAYABLE_COLUMNS);
    conn.query_row(&sql, [payable_id], payable_from_row)
        .optional()?
        .ok_or(LedgerError::NotFound(Owned::Payable.label()))
}

/// Open payables first by due date, then newest.
pub fn list_payables(
    conn: &Connection,
    user_id: &str,
    filter: PayableFilter,
) -> LedgerResult<Vec<Payable>> {
    let status_clause = match filter {
        PayableFilter::All => "",
        PayableFilter::Open => "AND is_paid = 0",
        PayableFilter::Paid => "AND is_paid = 1",
    };

    let sql = format!(
        "SELECT {} FROM payables
         WHERE user_id = ?1 {}
         ORDER BY is_paid ASC, due_date IS NULL, due_date ASC, created_at DESC",
        PAYABLE_COLUMNS, status_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let payables = stmt
        .query_map([user_id], payable_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payables)
}

fn save_payment(conn: &Connection, payable: &Payable) -> LedgerResult<()> {
    conn.execute(
        "UPDATE payables
         SET paid_amount = ?1, is_paid = ?2, paid_date = ?3, updated_at = ?4
         WHERE id = ?5 AND user_id = ?6",
        params![
            money::to_sql(payable.paid_amount),
            payable.is_paid,
            payable.paid_date.map(timestamp),
            timestamp(payable.updated_at),
            payable.id,
            payable.user_id,
        ],
    )?;
    Ok(())
}

/// Apply `amount` to the caller's payable and record the matching ledger entry.
pub fn apply_payment(
    conn: &mut Connection,
    payable_id: &str,
    user_id: &str,
    amount: Decimal,
) -> LedgerResult<PaymentResult> {
    let amount = money::validate_positive(amount, "amount")?;

    let tx = write_tx(conn)?;
    let mut payable = get_payable(&tx, payable_id, user_id)?;

    let plan = match plan_payment(&payable, amount) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(%payable_id, %amount, error = %e, "payment rejected");
            return Err(e);
        }
    };

    let paid_at = now();
    payable.paid_amount = plan.new_paid;
    payable.updated_at = paid_at;
    if plan.settles {
        payable.is_paid = true;
        payable.paid_date = Some(paid_at);
    }
    save_payment(&tx, &payable)?;

    let entry = record_entry(
        &tx,
        NewLedgerEntry {
            user_id: user_id.to_string(),
            amount: plan.amount,
            flow: Flow::Expense,
            category: format!("Debt Payment - {}", payable.category),
            date: Some(paid_at),
            notes: Some(payment_notes(&payable)),
        },
    )?;

    tx.commit()?;

    let payment = PaymentSummary {
        amount: plan.amount,
        remaining_amount: plan.remaining_after(payable.amount),
        is_fully_paid: plan.settles,
    };

    tracing::info!(
        %payable_id,
        amount = %payment.amount,
        remaining = %payment.remaining_amount,
        settled = payment.is_fully_paid,
        "payment applied"
    );

    Ok(PaymentResult {
        payable,
        payment,
        entry,
    })
}

// ============================================================================
// BILL REMINDERS
// ============================================================================

fn reminder(payable: &Payable, due: NaiveDate, today: NaiveDate) -> NewNotification {
    let (title, verb, priority) = if due < today {
        ("Bill overdue", "was", Priority::High)
    } else {
        ("Bill due soon", "is", Priority::Normal)
    };

    NewNotification {
        user_id: payable.user_id.clone(),
        kind: "bill".to_string(),
        title: title.to_string(),
        message: format!(
            "{} {} due on {} ({} remaining)",
            payable.name,
            verb,
            due,
            payable.remaining()
        ),
        data: Some(json!({
            "payableId": payable.id,
            "dueDate": due,
            "remainingAmount": payable.remaining(),
        })),
        priority,
    }
}

/// Write a "bill" reminder for every open payable due on or before
/// `today + within_days` that has no unread reminder yet. Nothing is written
/// when the user turned bill reminders off.
pub fn remind_due_payables(
    conn: &mut Connection,
    user_id: &str,
    today: NaiveDate,
    within_days: u32,
) -> LedgerResult<Vec<Notification>> {
    let horizon = today
        .checked_add_days(Days::new(u64::from(within_days)))
        .ok_or_else(|| LedgerError::invalid("reminder window is too large"))?;

    let tx = write_tx(conn)?;
    if !preferences_or_default(&tx, user_id)?.bill_reminders {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM payables p
         WHERE p.user_id = ?1 AND p.is_paid = 0
           AND p.due_date IS NOT NULL AND p.due_date <= ?2
           AND NOT EXISTS (
               SELECT 1 FROM notifications n
               WHERE n.user_id = p.user_id AND n.type = 'bill' AND n.is_read = 0
                 AND json_extract(n.data, '$.payableId') = p.id
           )
         ORDER BY p.due_date ASC, p.created_at ASC",
        PAYABLE_COLUMNS
    );
    let due: Vec<Payable> = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, horizon], payable_from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut sent = Vec::with_capacity(due.len());
    for payable in &due {
        if let Some(due_date) = payable.due_date {
            sent.push(create_notification(&tx, reminder(payable, due_date, today))?);
        }
    }
    tx.commit()?;

    tracing::info!(%user_id, %horizon, reminders = sent.len(), "bill reminders written");
    Ok(sent)
}
