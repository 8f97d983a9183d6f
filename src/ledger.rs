// 📒 Ledger - append-only income/expense entries and their statistics

use crate::db::{conversion_error, new_id, now, time_column, timestamp};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Flow, LedgerEntry};
use crate::money::{self, amount_column};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub amount: Decimal,
    pub flow: Flow,
    pub category: String,
    pub date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Totals for the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub entry_count: i64,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net: Decimal,
    pub by_category: Vec<CategoryStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: String,
    #[serde(rename = "type")]
    pub flow: Flow,
    pub count: i64,
    pub total: Decimal,
}

const ENTRY_COLUMNS: &str = "id, user_id, amount, flow, category, date, notes, created_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let flow: String = row.get(3)?;

    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: amount_column(row, 2)?,
        flow: flow
            .parse()
            .map_err(|e| conversion_error(3, e))?,
        category: row.get(4)?,
        date: time_column(row, 5)?,
        notes: row.get(6)?,
        created_at: time_column(row, 7)?,
    })
}

/// Validate and append one entry.
pub fn record_entry(conn: &Connection, new: NewLedgerEntry) -> LedgerResult<LedgerEntry> {
    let amount = money::validate_positive(new.amount, "amount")?;
    let category = new.category.trim();
    if category.is_empty() {
        return Err(LedgerError::invalid("category is required"));
    }

    let recorded_at = now();
    let entry = LedgerEntry {
        id: new_id(),
        user_id: new.user_id,
        amount,
        flow: new.flow,
        category: category.to_string(),
        date: new.date.unwrap_or(recorded_at),
        notes: new.notes.filter(|n| !n.trim().is_empty()),
        created_at: recorded_at,
    };

    conn.execute(
        "INSERT INTO expenses (id, user_id, amount, flow, category, date, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.user_id,
            money::to_sql(entry.amount),
            entry.flow.as_str(),
            entry.category,
            timestamp(entry.date),
            entry.notes,
            timestamp(entry.created_at),
        ],
    )?;

    tracing::debug!(
        entry_id = %entry.id,
        flow = entry.flow.as_str(),
        amount = %entry.amount,
        "ledger entry recorded"
    );

    Ok(entry)
}

/// Newest first, optionally filtered by flow.
pub fn list_entries(
    conn: &Connection,
    user_id: &str,
    flow: Option<Flow>,
    limit: u32,
    offset: u32,
) -> LedgerResult<Vec<LedgerEntry>> {
    let sql = format!(
        "SELECT {} FROM expenses
         WHERE user_id = ?1 AND (?2 IS NULL OR flow = ?2)
         ORDER BY date DESC, created_at DESC, rowid DESC
         LIMIT ?3 OFFSET ?4",
        ENTRY_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(
            params![user_id, flow.map(|f| f.as_str()), limit, offset],
            entry_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

fn add_amounts(total: Decimal, amount: Decimal) -> LedgerResult<Decimal> {
    total
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Internal("ledger totals overflow".to_string()))
}

/// Aggregate income/expense totals, overall and per category.
///
/// Sums are done on Decimal values in Rust; SQLite would sum the TEXT
/// amounts as floating point.
pub fn ledger_stats(conn: &Connection, user_id: &str) -> LedgerResult<LedgerStats> {
    let mut stmt = conn.prepare(
        "SELECT amount, flow, category FROM expenses WHERE user_id = ?1",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            let flow: String = row.get(1)?;
            Ok((
                amount_column(row, 0)?,
                flow.parse::<Flow>()
                    .map_err(|e| conversion_error(1, e))?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut total_income = money::to_cents(Decimal::ZERO);
    let mut total_expenses = money::to_cents(Decimal::ZERO);
    let mut by_category: BTreeMap<(String, &'static str), (Flow, i64, Decimal)> = BTreeMap::new();

    for (amount, flow, category) in &rows {
        let total = match flow {
            Flow::Income => &mut total_income,
            Flow::Expense => &mut total_expenses,
        };
        *total = add_amounts(*total, *amount)?;

        let entry = by_category
            .entry((category.clone(), flow.as_str()))
            .or_insert((*flow, 0, money::to_cents(Decimal::ZERO)));
        entry.1 += 1;
        entry.2 = add_amounts(entry.2, *amount)?;
    }

    let net = total_income
        .checked_sub(total_expenses)
        .ok_or_else(|| LedgerError::Internal("ledger totals overflow".to_string()))?;

    Ok(LedgerStats {
        entry_count: rows.len() as i64,
        total_income,
        total_expenses,
        net,
        by_category: by_category
            .into_iter()
            .map(|((category, _), (flow, count, total))| CategoryStat {
                category,
                flow,
                count,
                total,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_user;
    use crate::db::setup_database;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let user = create_user(&conn, "ledger@example.com", None).unwrap();
        (conn, user.id)
    }

    fn entry(user_id: &str, amount: &str, flow: Flow, category: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: user_id.to_string(),
            amount: d(amount),
            flow,
            category: category.to_string(),
            date: None,
            notes: None,
        }
    }

    #[test]
    fn test_record_and_list_entries() {
        let (conn, user) = setup();
        record_entry(&conn, entry(&user, "45.99", Flow::Expense, "Dining")).unwrap();
        record_entry(&conn, entry(&user, "2000", Flow::Income, "Salary")).unwrap();

        let all = list_entries(&conn, &user, None, 50, 0).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].category, "Salary");
        assert_eq!(all[0].amount, d("2000.00"));

        let expenses = list_entries(&conn, &user, Some(Flow::Expense), 50, 0).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, d("45.99"));
    }

    #[test]
    fn test_record_rejects_invalid_input() {
        let (conn, user) = setup();
        assert!(record_entry(&conn, entry(&user, "0", Flow::Expense, "Dining")).is_err());
        assert!(record_entry(&conn, entry(&user, "10", Flow::Expense, "   ")).is_err());
        assert!(list_entries(&conn, &user, None, 50, 0).unwrap().is_empty());
    }

    #[test]
    fn test_stats_sum_exactly() {
        let (conn, user) = setup();
        for _ in 0..3 {
            record_entry(&conn, entry(&user, "0.10", Flow::Expense, "Coffee")).unwrap();
        }
        record_entry(&conn, entry(&user, "0.20", Flow::Expense, "Snacks")).unwrap();
        record_entry(&conn, entry(&user, "1.00", Flow::Income, "Gift")).unwrap();

        let stats = ledger_stats(&conn, &user).unwrap();
        assert_eq!(stats.entry_count, 5);
        assert_eq!(stats.total_expenses, d("0.50"));
        assert_eq!(stats.total_income, d("1.00"));
        assert_eq!(stats.net, d("0.50"));

        let coffee = stats
            .by_category
            .iter()
            .find(|c| c.category == "Coffee")
            .unwrap();
        assert_eq!(coffee.count, 3);
        assert_eq!(coffee.total, d("0.30"));
    }

    #[test]
    fn test_stats_report_overflow_instead_of_panicking() {
        let (conn, user) = setup();
        let err = record_entry(&conn, entry(&user, "50000000000000000000000000000", Flow::Income, "Windfall"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);

        for id in ["e1", "e2"] {
            conn.execute(
                "INSERT INTO expenses (id, user_id, amount, flow, category, date, created_at)
                 VALUES (?1, ?2, '50000000000000000000000000000', 'income', 'Windfall',
                         '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:00.000000Z')",
                params![id, user],
            )
            .unwrap();
        }

        let err = ledger_stats(&conn, &user).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
