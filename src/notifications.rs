// 🔔 Notification Store - append-only messages with read state, plus
// per-user delivery preferences.

use crate::db::{
    conversion_error, new_id, now, optional_time_column, time_column, timestamp, write_tx,
};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{Frequency, Notification, NotificationPreference, Priority};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub priority: Priority,
}

/// Which notifications a mark-read request targets.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkRead {
    Ids(Vec<String>),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

impl NotificationPage {
    pub fn has_more(&self) -> bool {
        i64::from(self.offset) + i64::from(self.limit) < self.total
    }
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub in_app_enabled: Option<bool>,
    pub budget_alerts: Option<bool>,
    pub bill_reminders: Option<bool>,
    pub goal_updates: Option<bool>,
    pub frequency: Option<Frequency>,
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, data, priority, is_read, read_at, created_at";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let data: Option<String> = row.get(5)?;
    let priority: String = row.get(6)?;

    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        data: data
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| conversion_error(5, LedgerError::Corrupt(e.to_string())))
            })
            .transpose()?,
        priority: priority.parse().map_err(|e| conversion_error(6, e))?,
        is_read: row.get(7)?,
        read_at: optional_time_column(row, 8)?,
        created_at: time_column(row, 9)?,
    })
}

pub fn create_notification(conn: &Connection, new: NewNotification) -> LedgerResult<Notification> {
    if new.kind.trim().is_empty() {
        return Err(LedgerError::invalid("notification type is required"));
    }
    if new.title.trim().is_empty() {
        return Err(LedgerError::invalid("notification title is required"));
    }

    let notification = Notification {
        id: new_id(),
        user_id: new.user_id,
        kind: new.kind,
        title: new.title,
        message: new.message,
        data: new.data,
        priority: new.priority,
        is_read: false,
        read_at: None,
        created_at: now(),
    };

    let data_json = notification
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| LedgerError::Internal(e.to_string()))?;

    conn.execute(
        "INSERT INTO notifications (id, user_id, type, title, message, data, priority, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        params![
            notification.id,
            notification.user_id,
            notification.kind,
            notification.title,
            notification.message,
            data_json,
            notification.priority.as_str(),
            timestamp(notification.created_at),
        ],
    )?;

    tracing::debug!(
        notification_id = %notification.id,
        kind = %notification.kind,
        "notification created"
    );

    Ok(notification)
}

/// Ids bound per UPDATE, well under SQLite's host-parameter limit.
const MARK_READ_CHUNK: usize = 500;

/// Flag notifications as read. Ids the caller does not own are skipped, not
/// reported: the returned count only covers the caller's own notifications.
/// Large id lists are applied in chunks inside one transaction.
pub fn mark_read(conn: &mut Connection, user_id: &str, target: MarkRead) -> LedgerResult<usize> {
    let read_at = timestamp(now());

    let updated = match target {
        MarkRead::All => conn.execute(
            "UPDATE notifications SET is_read = 1, read_at = ?1
             WHERE user_id = ?2 AND is_read = 0",
            params![read_at, user_id],
        )?,
        MarkRead::Ids(mut ids) => {
            if ids.is_empty() {
                return Err(LedgerError::invalid(
                    "provide notificationIds or set markAll",
                ));
            }
            ids.sort_unstable();
            ids.dedup();

            let tx = write_tx(conn)?;
            let mut updated = 0;
            for chunk in ids.chunks(MARK_READ_CHUNK) {
                let placeholders = (0..chunk.len())
                    .map(|i| format!("?{}", i + 3))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?1)
                     WHERE user_id = ?2 AND id IN ({})",
                    placeholders
                );

                let mut values: Vec<&str> = vec![read_at.as_str(), user_id];
                values.extend(chunk.iter().map(String::as_str));
                updated += tx.execute(&sql, params_from_iter(values))?;
            }
            tx.commit()?;
            updated
        }
    };

    tracing::info!(%user_id, updated, "notifications marked read");
    Ok(updated)
}

/// Newest-first page of the caller's notifications.
pub fn list_notifications(
    conn: &Connection,
    user_id: &str,
    limit: u32,
    offset: u32,
    unread_only: bool,
) -> LedgerResult<NotificationPage> {
    let unread_clause = if unread_only { "AND is_read = 0" } else { "" };

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 {}",
            unread_clause
        ),
        [user_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM notifications
         WHERE user_id = ?1 {}
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2 OFFSET ?3",
        NOTIFICATION_COLUMNS, unread_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params![user_id, limit, offset], notification_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NotificationPage {
        items,
        total,
        limit,
        offset,
    })
}

pub fn unread_count(conn: &Connection, user_id: &str) -> LedgerResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// PREFERENCES
// ============================================================================

fn preference_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationPreference> {
    let frequency: String = row.get(7)?;

    Ok(NotificationPreference {
        user_id: row.get(0)?,
        email_enabled: row.get(1)?,
        push_enabled: row.get(2)?,
        in_app_enabled: row.get(3)?,
        budget_alerts: row.get(4)?,
        bill_reminders: row.get(5)?,
        goal_updates: row.get(6)?,
        frequency: frequency.parse().map_err(|e| conversion_error(7, e))?,
        created_at: time_column(row, 8)?,
        updated_at: time_column(row, 9)?,
    })
}

fn find_preferences(conn: &Connection, user_id: &str) -> LedgerResult<Option<NotificationPreference>> {
    Ok(conn
        .query_row(
            "SELECT user_id, email_enabled, push_enabled, in_app_enabled, budget_alerts,
                    bill_reminders, goal_updates, frequency, created_at, updated_at
             FROM notification_preferences WHERE user_id = ?1",
            [user_id],
            preference_from_row,
        )
        .optional()?)
}

fn save_preferences(conn: &Connection, prefs: &NotificationPreference) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO notification_preferences (
            user_id, email_enabled, push_enabled, in_app_enabled, budget_alerts,
            bill_reminders, goal_updates, frequency, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(user_id) DO UPDATE SET
            email_enabled = excluded.email_enabled,
            push_enabled = excluded.push_enabled,
            in_app_enabled = excluded.in_app_enabled,
            budget_alerts = excluded.budget_alerts,
            bill_reminders = excluded.bill_reminders,
            goal_updates = excluded.goal_updates,
            frequency = excluded.frequency,
            updated_at = excluded.updated_at",
        params![
            prefs.user_id,
            prefs.email_enabled,
            prefs.push_enabled,
            prefs.in_app_enabled,
            prefs.budget_alerts,
            prefs.bill_reminders,
            prefs.goal_updates,
            prefs.frequency.as_str(),
            timestamp(prefs.created_at),
            timestamp(prefs.updated_at),
        ],
    )?;
    Ok(())
}

/// Return the caller's preferences, writing the defaults on first access.
pub fn get_or_create_preferences(
    conn: &mut Connection,
    user_id: &str,
) -> LedgerResult<NotificationPreference> {
    let tx = write_tx(conn)?;
    let prefs = match find_preferences(&tx, user_id)? {
        Some(existing) => existing,
        None => {
            let defaults = NotificationPreference::defaults(user_id, now());
            save_preferences(&tx, &defaults)?;
            tracing::info!(%user_id, "default notification preferences created");
            defaults
        }
    };
    tx.commit()?;

    Ok(prefs)
}

/// The caller's preferences, or the defaults when none are stored yet.
/// Never writes.
pub fn preferences_or_default(conn: &Connection, user_id: &str) -> LedgerResult<NotificationPreference> {
    Ok(find_preferences(conn, user_id)?
        .unwrap_or_else(|| NotificationPreference::defaults(user_id, now())))
}

pub fn update_preferences(
    conn: &mut Connection,
    user_id: &str,
    update: PreferencesUpdate,
) -> LedgerResult<NotificationPreference> {
    let tx = write_tx(conn)?;
    let updated_at = now();
    let mut prefs = find_preferences(&tx, user_id)?
        .unwrap_or_else(|| NotificationPreference::defaults(user_id, updated_at));

    if let Some(v) = update.email_enabled {
        prefs.email_enabled = v;
    }
    if let Some(v) = update.push_enabled {
        prefs.push_enabled = v;
    }
    if let Some(v) = update.in_app_enabled {
        prefs.in_app_enabled = v;
    }
    if let Some(v) = update.budget_alerts {
        prefs.budget_alerts = v;
    }
    if let Some(v) = update.bill_reminders {
        prefs.bill_reminders = v;
    }
    if let Some(v) = update.goal_updates {
        prefs.goal_updates = v;
    }
    if let Some(v) = update.frequency {
        prefs.frequency = v;
    }
    prefs.updated_at = updated_at;

    save_preferences(&tx, &prefs)?;
    tx.commit()?;

    Ok(prefs)
}
