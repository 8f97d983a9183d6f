use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// Open (or create) the database file and apply pragmas + schema.
pub fn open_database(path: &Path) -> LedgerResult<Connection> {
    let conn = Connection::open(path)?;

    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> LedgerResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users & Sessions (only token digests are stored)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            name TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Payables (amounts as TEXT decimals, see money.rs)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payables (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            description TEXT,
            amount TEXT NOT NULL,
            paid_amount TEXT NOT NULL DEFAULT '0.00',
            is_paid INTEGER NOT NULL DEFAULT 0,
            due_date TEXT,
            paid_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Ledger entries (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            amount TEXT NOT NULL,
            flow TEXT NOT NULL CHECK (flow IN ('income', 'expense')),
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Budgets - one row per (user, category, period)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS budgets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            category TEXT NOT NULL,
            amount TEXT NOT NULL,
            period TEXT NOT NULL DEFAULT 'monthly',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, category, period)
        )",
        [],
    )?;

    // ==========================================================================
    // Saving goals
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS saving_goals (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            target_amount TEXT NOT NULL,
            current_amount TEXT NOT NULL DEFAULT '0.00',
            deadline TEXT,
            is_completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Notifications & delivery preferences
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            data TEXT,
            priority TEXT NOT NULL DEFAULT 'normal',
            is_read INTEGER NOT NULL DEFAULT 0,
            read_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notification_preferences (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            email_enabled INTEGER NOT NULL,
            push_enabled INTEGER NOT NULL,
            in_app_enabled INTEGER NOT NULL,
            budget_alerts INTEGER NOT NULL,
            bill_reminders INTEGER NOT NULL,
            goal_updates INTEGER NOT NULL,
            frequency TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payables_user ON payables(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_saving_goals_user ON saving_goals(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(user_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notifications_user_created ON notifications(user_id, created_at)",
        [],
    )?;

    Ok(())
}

/// Begin a write transaction that takes the database write lock up front.
///
/// Every read inside it sees the state it will write against, so
/// read-modify-write sequences cannot interleave with another writer.
pub fn write_tx(conn: &mut Connection) -> LedgerResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so lexical order matches time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("invalid timestamp '{}': {}", raw, e)))
}

pub fn parse_optional_timestamp(raw: Option<String>) -> LedgerResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

/// Wrap a decode failure so it can travel through a rusqlite row mapper.
pub fn conversion_error(idx: usize, err: LedgerError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

pub fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    parse_optional_timestamp(raw).map_err(|e| conversion_error(idx, e))
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Count rows in a table (tests and CLI diagnostics).
pub fn count_rows(conn: &Connection, table: &str) -> LedgerResult<i64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        for table in [
            "users",
            "sessions",
            "payables",
            "expenses",
            "budgets",
            "saving_goals",
            "notifications",
            "notification_preferences",
        ] {
            assert_eq!(count_rows(&conn, table).unwrap(), 0, "table {}", table);
        }
    }

    #[test]
    fn test_budget_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, email, created_at) VALUES ('u1', 'a@b.c', '2025-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO budgets (id, user_id, category, amount, period, created_at, updated_at)
                      VALUES (?1, 'u1', 'Food', '100.00', 'monthly', 'now', 'now')";
        conn.execute(insert, ["b1"]).unwrap();
        let second = conn.execute(insert, ["b2"]);

        assert!(matches!(
            second,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        ));
        assert_eq!(count_rows(&conn, "budgets").unwrap(), 1);
    }

    #[test]
    fn test_timestamp_round_trip_and_ordering() {
        let earlier = parse_timestamp("2025-01-01T00:00:00Z").unwrap();
        let later = parse_timestamp("2025-01-01T00:00:00.5Z").unwrap();

        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(parse_timestamp(&timestamp(later)).unwrap(), later);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
