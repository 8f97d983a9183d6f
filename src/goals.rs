// 🏦 Saving Goals - progress toward a target amount
//
// Contributions follow the payable rules: a positive cent amount, never past
// the target, and the goal closes once the target is reached. A contribution
// and its "goal" notification commit in the same IMMEDIATE transaction.

use crate::auth::{require_owned, Owned};
use crate::db::{new_id, now, optional_time_column, time_column, timestamp, write_tx};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Priority, SavingGoal};
use crate::money::{self, amount_column};
use crate::notifications::{create_notification, preferences_or_default, NewNotification};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct NewGoal {
    pub user_id: String,
    pub name: String,
    pub target_amount: Decimal,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionSummary {
    pub amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionResult {
    pub goal: SavingGoal,
    pub contribution: ContributionSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalProgress {
    pub amount: Decimal,
    pub new_current: Decimal,
    pub completes: bool,
}

/// Decide whether `amount` can go toward `goal`. `amount` must already be a
/// validated positive cent value.
pub fn plan_contribution(goal: &SavingGoal, amount: Decimal) -> LedgerResult<GoalProgress> {
    if goal.is_completed {
        return Err(LedgerError::GoalReached);
    }

    let new_current = match goal.current_amount.checked_add(amount) {
        Some(sum) if sum <= goal.target_amount => sum,
        _ => {
            return Err(LedgerError::ExceedsTarget {
                remaining: goal.remaining(),
            })
        }
    };

    Ok(GoalProgress {
        amount,
        new_current,
        completes: new_current == goal.target_amount,
    })
}

const GOAL_COLUMNS: &str = "id, user_id, name, target_amount, current_amount, deadline, \
                            is_completed, completed_at, created_at, updated_at";

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<SavingGoal> {
    Ok(SavingGoal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        target_amount: amount_column(row, 3)?,
        current_amount: amount_column(row, 4)?,
        deadline: row.get(5)?,
        is_completed: row.get(6)?,
        completed_at: optional_time_column(row, 7)?,
        created_at: time_column(row, 8)?,
        updated_at: time_column(row, 9)?,
    })
}

pub fn create_goal(conn: &Connection, new: NewGoal) -> LedgerResult<SavingGoal> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("name is required"));
    }
    let target_amount = money::validate_positive(new.target_amount, "targetAmount")?;

    let created_at = now();
    let goal = SavingGoal {
        id: new_id(),
        user_id: new.user_id,
        name: name.to_string(),
        target_amount,
        current_amount: money::to_cents(Decimal::ZERO),
        deadline: new.deadline,
        is_completed: false,
        completed_at: None,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        "INSERT INTO saving_goals (id, user_id, name, target_amount, current_amount, deadline,
                                   is_completed, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7)",
        params![
            goal.id,
            goal.user_id,
            goal.name,
            money::to_sql(goal.target_amount),
            money::to_sql(goal.current_amount),
            goal.deadline,
            timestamp(created_at),
        ],
    )?;

    tracing::info!(goal_id = %goal.id, target = %goal.target_amount, "saving goal created");
    Ok(goal)
}

pub fn get_goal(conn: &Connection, goal_id: &str, user_id: &str) -> LedgerResult<SavingGoal> {
    require_owned(conn, Owned::Goal, goal_id, user_id)?;

    let sql = format!("SELECT {} FROM saving_goals WHERE id = ?1", GOAL_COLUMNS);
    conn.query_row(&sql, [goal_id], goal_from_row)
        .optional()?
        .ok_or(LedgerError::NotFound(Owned::Goal.label()))
}

/// Open goals first, nearest deadline first.
pub fn list_goals(conn: &Connection, user_id: &str) -> LedgerResult<Vec<SavingGoal>> {
    let sql = format!(
        "SELECT {} FROM saving_goals
         WHERE user_id = ?1
         ORDER BY is_completed ASC, deadline IS NULL, deadline ASC, created_at DESC",
        GOAL_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let goals = stmt
        .query_map([user_id], goal_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(goals)
}

fn contribution_notification(goal: &SavingGoal, progress: &GoalProgress) -> NewNotification {
    let (title, message, priority) = if progress.completes {
        (
            "Goal reached",
            format!("You reached your {} goal of {}", goal.name, goal.target_amount),
            Priority::High,
        )
    } else {
        (
            "Goal progress",
            format!(
                "You added {} to {}; {} to go",
                progress.amount,
                goal.name,
                goal.remaining()
            ),
            Priority::Normal,
        )
    };

    NewNotification {
        user_id: goal.user_id.clone(),
        kind: "goal".to_string(),
        title: title.to_string(),
        message,
        data: Some(json!({
            "goalId": goal.id,
            "amount": progress.amount,
            "currentAmount": goal.current_amount,
            "targetAmount": goal.target_amount,
            "completed": progress.completes,
        })),
        priority,
    }
}

/// Put `amount` toward the caller's goal. A "goal" notification is written
/// unless the user turned goal updates off.
pub fn contribute(
    conn: &mut Connection,
    goal_id: &str,
    user_id: &str,
    amount: Decimal,
) -> LedgerResult<ContributionResult> {
    let amount = money::validate_positive(amount, "amount")?;

    let tx = write_tx(conn)?;
    let mut goal = get_goal(&tx, goal_id, user_id)?;

    let progress = match plan_contribution(&goal, amount) {
        Ok(progress) => progress,
        Err(e) => {
            tracing::warn!(%goal_id, %amount, error = %e, "contribution rejected");
            return Err(e);
        }
    };

    let updated_at = now();
    goal.current_amount = progress.new_current;
    goal.updated_at = updated_at;
    if progress.completes {
        goal.is_completed = true;
        goal.completed_at = Some(updated_at);
    }

    tx.execute(
        "UPDATE saving_goals
         SET current_amount = ?1, is_completed = ?2, completed_at = ?3, updated_at = ?4
         WHERE id = ?5 AND user_id = ?6",
        params![
            money::to_sql(goal.current_amount),
            goal.is_completed,
            goal.completed_at.map(timestamp),
            timestamp(updated_at),
            goal.id,
            goal.user_id,
        ],
    )?;

    if preferences_or_default(&tx, user_id)?.goal_updates {
        create_notification(&tx, contribution_notification(&goal, &progress))?;
    }
    tx.commit()?;

    tracing::info!(
        %goal_id,
        amount = %amount,
        current = %goal.current_amount,
        completed = goal.is_completed,
        "contribution applied"
    );

    let contribution = ContributionSummary {
        amount,
        remaining_amount: goal.remaining(),
        is_completed: goal.is_completed,
    };
    Ok(ContributionResult { goal, contribution })
}

pub fn delete_goal(conn: &Connection, user_id: &str, goal_id: &str) -> LedgerResult<()> {
    require_owned(conn, Owned::Goal, goal_id, user_id)?;
    conn.execute(
        "DELETE FROM saving_goals WHERE id = ?1 AND user_id = ?2",
        params![goal_id, user_id],
    )?;

    tracing::info!(%goal_id, "saving goal deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_user;
    use crate::db::{count_rows, setup_database};
    use crate::error::ErrorKind;
    use crate::notifications::{list_notifications, update_preferences, PreferencesUpdate};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let user = create_user(&conn, "saver@example.com", None).unwrap();
        (conn, user.id)
    }

    fn goal(conn: &Connection, user_id: &str, target: &str) -> SavingGoal {
        create_goal(
            conn,
            NewGoal {
                user_id: user_id.to_string(),
                name: "Emergency fund".to_string(),
                target_amount: d(target),
                deadline: NaiveDate::from_ymd_opt(2026, 12, 31),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_contributions_reach_the_target() {
        let (mut conn, user) = setup();
        let g = goal(&conn, &user, "1000");

        let first = contribute(&mut conn, &g.id, &user, d("400")).unwrap();
        assert_eq!(first.contribution.remaining_amount.to_string(), "600.00");
        assert!(!first.contribution.is_completed);

        let second = contribute(&mut conn, &g.id, &user, d("600")).unwrap();
        assert!(second.contribution.is_completed);
        assert_eq!(second.contribution.remaining_amount.to_string(), "0.00");

        let stored = get_goal(&conn, &g.id, &user).unwrap();
        assert_eq!(stored.current_amount, d("1000"));
        assert!(stored.is_completed);
        assert!(stored.completed_at.is_some());

        let err = contribute(&mut conn, &g.id, &user, d("1")).unwrap_err();
        assert!(matches!(err, LedgerError::GoalReached));
        assert_eq!(err.kind(), ErrorKind::AlreadySettled);
    }

    #[test]
    fn test_overshoot_is_rejected_without_side_effects() {
        let (mut conn, user) = setup();
        let g = goal(&conn, &user, "100");
        contribute(&mut conn, &g.id, &user, d("70")).unwrap();

        let err = contribute(&mut conn, &g.id, &user, d("40")).unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsTarget { remaining } if remaining == d("30")));
        assert_eq!(get_goal(&conn, &g.id, &user).unwrap().current_amount, d("70"));
        assert_eq!(count_rows(&conn, "notifications").unwrap(), 1);
    }

    #[test]
    fn test_overflowing_sum_is_exceeds_target() {
        let (conn, user) = setup();
        let mut g = goal(&conn, &user, "10");
        g.target_amount = d("70000000000000000000000000000");
        g.current_amount = d("40000000000000000000000000000");

        let err = plan_contribution(&g, d("40000000000000000000000000000")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExceedsRemaining);
    }

    #[test]
    fn test_notifications_follow_goal_updates_preference() {
        let (mut conn, user) = setup();
        let g = goal(&conn, &user, "50");

        contribute(&mut conn, &g.id, &user, d("20")).unwrap();
        let page = list_notifications(&conn, &user, 10, 0, false).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, "goal");
        assert_eq!(page.items[0].title, "Goal progress");
        assert_eq!(page.items[0].data.as_ref().unwrap()["currentAmount"], "20.00");

        update_preferences(
            &mut conn,
            &user,
            PreferencesUpdate {
                goal_updates: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        contribute(&mut conn, &g.id, &user, d("30")).unwrap();
        assert_eq!(count_rows(&conn, "notifications").unwrap(), 1);
    }

    #[test]
    fn test_goals_are_owned() {
        let (mut conn, user) = setup();
        let other = create_user(&conn, "other@example.com", None).unwrap();
        let g = goal(&conn, &user, "10");

        let err = contribute(&mut conn, &g.id, &other.id, d("1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            delete_goal(&conn, &other.id, &g.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(list_goals(&conn, &other.id).unwrap().is_empty());

        delete_goal(&conn, &user, &g.id).unwrap();
        assert!(list_goals(&conn, &user).unwrap().is_empty());
    }

    #[test]
    fn test_create_goal_validates() {
        let (conn, user) = setup();
        for (name, target) in [("", "10"), ("Car", "0"), ("Car", "10.001")] {
            let err = create_goal(
                &conn,
                NewGoal {
                    user_id: user.clone(),
                    name: name.to_string(),
                    target_amount: d(target),
                    deadline: None,
                },
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(count_rows(&conn, "saving_goals").unwrap(), 0);
    }
}
