// 🎯 Budgets - per-category spending ceilings, one per (user, category, period)
//
// An upsert decides "created" vs "updated" from a lookup made inside the same
// IMMEDIATE transaction as the write, then reports the change through the
// notification store. The UNIQUE(user_id, category, period) constraint keeps
// one row per key no matter what.

use crate::auth::{require_owned, Owned};
use crate::db::{conversion_error, new_id, now, time_column, timestamp, write_tx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Budget, BudgetPeriod, Priority};
use crate::money::{self, amount_column};
use crate::notifications::{create_notification, NewNotification};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetUpsert {
    pub budget: Budget,
    pub created: bool,
}

const BUDGET_COLUMNS: &str = "id, user_id, category, amount, period, created_at, updated_at";

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<Budget> {
    let period: String = row.get(4)?;

    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: row.get(2)?,
        amount: amount_column(row, 3)?,
        period: period.parse().map_err(|e| conversion_error(4, e))?,
        created_at: time_column(row, 5)?,
        updated_at: time_column(row, 6)?,
    })
}

fn find_budget(
    conn: &Connection,
    user_id: &str,
    category: &str,
    period: BudgetPeriod,
) -> LedgerResult<Option<Budget>> {
    let sql = format!(
        "SELECT {} FROM budgets WHERE user_id = ?1 AND category = ?2 AND period = ?3",
        BUDGET_COLUMNS
    );

    Ok(conn
        .query_row(&sql, params![user_id, category, period.as_str()], budget_from_row)
        .optional()?)
}

pub fn get_budget(conn: &Connection, budget_id: &str, user_id: &str) -> LedgerResult<Budget> {
    require_owned(conn, Owned::Budget, budget_id, user_id)?;

    let sql = format!("SELECT {} FROM budgets WHERE id = ?1", BUDGET_COLUMNS);
    conn.query_row(&sql, [budget_id], budget_from_row)
        .optional()?
        .ok_or(LedgerError::NotFound(Owned::Budget.label()))
}

fn budget_notification(budget: &Budget, created: bool) -> NewNotification {
    let (title, verb, action) = if created {
        ("Budget created", "set", "created")
    } else {
        ("Budget updated", "updated", "updated")
    };

    NewNotification {
        user_id: budget.user_id.clone(),
        kind: "budget".to_string(),
        title: title.to_string(),
        message: format!(
            "Your {} budget for {} has been {} to {}",
            budget.period, budget.category, verb, budget.amount
        ),
        data: Some(json!({
            "budgetId": budget.id,
            "category": budget.category,
            "amount": budget.amount,
            "period": budget.period,
            "action": action,
        })),
        priority: Priority::Normal,
    }
}

/// Create the budget for (user, category, period) or update its amount.
pub fn upsert_budget(
    conn: &mut Connection,
    user_id: &str,
    category: &str,
    amount: Decimal,
    period: Option<BudgetPeriod>,
) -> LedgerResult<BudgetUpsert> {
    let category = category.trim();
    if category.is_empty() {
        return Err(LedgerError::invalid("category is required"));
    }
    let amount = money::validate_positive(amount, "amount")?;
    let period = period.unwrap_or_default();

    let tx = write_tx(conn)?;
    let created = find_budget(&tx, user_id, category, period)?.is_none();

    let written_at = timestamp(now());
    let sql = format!(
        "INSERT INTO budgets (id, user_id, category, amount, period, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(user_id, category, period) DO UPDATE SET
            amount = excluded.amount,
            updated_at = excluded.updated_at
         RETURNING {}",
        BUDGET_COLUMNS
    );
    let budget = tx.query_row(
        &sql,
        params![
            new_id(),
            user_id,
            category,
            money::to_sql(amount),
            period.as_str(),
            written_at,
        ],
        budget_from_row,
    )?;

    create_notification(&tx, budget_notification(&budget, created))?;
    tx.commit()?;

    tracing::info!(
        budget_id = %budget.id,
        category = %budget.category,
        period = budget.period.as_str(),
        amount = %budget.amount,
        created,
        "budget saved"
    );

    Ok(BudgetUpsert { budget, created })
}

/// Change the amount of an existing budget by id. Category and period are
/// part of the budget's key and cannot change.
pub fn update_budget(
    conn: &mut Connection,
    user_id: &str,
    budget_id: &str,
    category: Option<&str>,
    amount: Decimal,
    period: Option<BudgetPeriod>,
) -> LedgerResult<Budget> {
    let existing = get_budget(conn, budget_id, user_id)?;

    if let Some(category) = category {
        if category.trim() != existing.category {
            return Err(LedgerError::invalid("a budget's category cannot be changed"));
        }
    }
    if let Some(period) = period {
        if period != existing.period {
            return Err(LedgerError::invalid("a budget's period cannot be changed"));
        }
    }

    let result = upsert_budget(
        conn,
        user_id,
        &existing.category,
        amount,
        Some(existing.period),
    )?;
    Ok(result.budget)
}

pub fn list_budgets(conn: &Connection, user_id: &str) -> LedgerResult<Vec<Budget>> {
    let sql = format!(
        "SELECT {} FROM budgets WHERE user_id = ?1 ORDER BY category ASC, period ASC",
        BUDGET_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let budgets = stmt
        .query_map([user_id], budget_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(budgets)
}

pub fn delete_budget(conn: &Connection, user_id: &str, budget_id: &str) -> LedgerResult<()> {
    require_owned(conn, Owned::Budget, budget_id, user_id)?;
    conn.execute(
        "DELETE FROM budgets WHERE id = ?1 AND user_id = ?2",
        params![budget_id, user_id],
    )?;

    tracing::info!(%budget_id, "budget deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_user;
    use crate::db::{count_rows, setup_database};
    use crate::error::ErrorKind;
    use crate::notifications::list_notifications;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let user = create_user(&conn, "budget@example.com", None).unwrap();
        (conn, user.id)
    }

    #[test]
    fn test_first_upsert_creates_second_updates() {
        let (mut conn, user) = setup();

        let first = upsert_budget(&mut conn, &user, "Food", d("400"), None).unwrap();
        assert!(first.created);
        assert_eq!(first.budget.period, BudgetPeriod::Monthly);
        assert_eq!(first.budget.amount, d("400"));

        let second = upsert_budget(&mut conn, &user, "Food", d("450.50"), None).unwrap();
        assert!(!second.created);
        assert_eq!(second.budget.id, first.budget.id);
        assert_eq!(second.budget.amount, d("450.50"));
        assert_eq!(second.budget.created_at, first.budget.created_at);

        assert_eq!(count_rows(&conn, "budgets").unwrap(), 1);
    }

    #[test]
    fn test_each_upsert_emits_one_notification() {
        let (mut conn, user) = setup();
        upsert_budget(&mut conn, &user, "Food", d("400"), None).unwrap();
        upsert_budget(&mut conn, &user, "Food", d("500"), None).unwrap();

        let page = list_notifications(&conn, &user, 10, 0, false).unwrap();
        assert_eq!(page.total, 2);

        let latest = &page.items[0];
        assert_eq!(latest.kind, "budget");
        assert_eq!(latest.title, "Budget updated");
        assert_eq!(
            latest.message,
            "Your monthly budget for Food has been updated to 500.00"
        );
        let data = latest.data.as_ref().unwrap();
        assert_eq!(data["category"], "Food");
        assert_eq!(data["amount"], "500.00");
        assert_eq!(data["period"], "monthly");
        assert_eq!(data["action"], "updated");

        assert_eq!(page.items[1].title, "Budget created");
    }

    #[test]
    fn test_period_is_part_of_the_key() {
        let (mut conn, user) = setup();
        assert!(upsert_budget(&mut conn, &user, "Food", d("100"), Some(BudgetPeriod::Weekly)).unwrap().created);
        assert!(upsert_budget(&mut conn, &user, "Food", d("400"), None).unwrap().created);
        assert_eq!(list_budgets(&conn, &user).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_input_writes_nothing() {
        let (mut conn, user) = setup();
        for (category, amount) in [("", "10"), ("  ", "10"), ("Food", "0"), ("Food", "-1")] {
            let err = upsert_budget(&mut conn, &user, category, d(amount), None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(count_rows(&conn, "budgets").unwrap(), 0);
        assert_eq!(count_rows(&conn, "notifications").unwrap(), 0);
    }

    #[test]
    fn test_update_by_id_keeps_key_fixed() {
        let (mut conn, user) = setup();
        let other = create_user(&conn, "other@example.com", None).unwrap();
        let created = upsert_budget(&mut conn, &user, "Rent", d("1200"), None).unwrap().budget;

        let updated = update_budget(&mut conn, &user, &created.id, Some("Rent"), d("1300"), None).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.amount, d("1300"));

        let err = update_budget(&mut conn, &user, &created.id, Some("Housing"), d("1"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = update_budget(&mut conn, &user, &created.id, None, d("1"), Some(BudgetPeriod::Yearly)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = update_budget(&mut conn, &other.id, &created.id, None, d("1"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_budget_requires_ownership() {
        let (mut conn, user) = setup();
        let other = create_user(&conn, "other@example.com", None).unwrap();
        let budget = upsert_budget(&mut conn, &user, "Fun", d("50"), None).unwrap().budget;

        assert_eq!(
            delete_budget(&conn, &other.id, &budget.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        delete_budget(&conn, &user, &budget.id).unwrap();
        assert!(list_budgets(&conn, &user).unwrap().is_empty());
    }
}
