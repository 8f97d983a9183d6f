// 🔐 Users, sessions and ownership checks
//
// Bearer tokens are random UUIDs handed to the user once; only their SHA-256
// digest is persisted. Ownership is checked in one place (require_owned) and
// always answers NotFound, whether the row is absent or belongs to someone else.

use crate::db::{new_id, now, optional_time_column, timestamp};
use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Entities that carry an owning user_id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owned {
    Payable,
    Budget,
    Notification,
    LedgerEntry,
    Goal,
}

impl Owned {
    fn table(&self) -> &'static str {
        match self {
            Owned::Payable => "payables",
            Owned::Budget => "budgets",
            Owned::Notification => "notifications",
            Owned::LedgerEntry => "expenses",
            Owned::Goal => "saving_goals",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Owned::Payable => "Payable",
            Owned::Budget => "Budget",
            Owned::Notification => "Notification",
            Owned::LedgerEntry => "Expense",
            Owned::Goal => "Saving goal",
        }
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn create_user(conn: &Connection, email: &str, name: Option<&str>) -> LedgerResult<User> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(LedgerError::invalid("a valid email address is required"));
    }

    let user = User {
        id: new_id(),
        email,
        name: name.map(str::to_string),
    };

    let result = conn.execute(
        "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, user.email, user.name, timestamp(now())],
    );

    match result {
        Ok(_) => {
            tracing::info!(user_id = %user.id, "user created");
            Ok(user)
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(LedgerError::invalid(format!("email {} is already registered", user.email)))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_user(conn: &Connection, user_id: &str) -> LedgerResult<User> {
    conn.query_row(
        "SELECT id, email, name FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(LedgerError::NotFound("User"))
}

/// Issue a new bearer token. The plain token is returned exactly once.
pub fn issue_session(
    conn: &Connection,
    user_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> LedgerResult<String> {
    find_user(conn, user_id)?;

    let token = uuid::Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            hash_token(&token),
            user_id,
            timestamp(now()),
            expires_at.map(timestamp),
        ],
    )?;

    Ok(token)
}

/// Resolve a bearer token to its user id.
pub fn authenticate(conn: &Connection, token: &str) -> LedgerResult<String> {
    let token = token.trim();
    if token.is_empty() {
        return Err(LedgerError::Unauthenticated);
    }

    let session = conn
        .query_row(
            "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
            [hash_token(token)],
            |row| Ok((row.get::<_, String>(0)?, optional_time_column(row, 1)?)),
        )
        .optional()?;

    match session {
        Some((user_id, Some(expires_at))) if expires_at <= now() => {
            tracing::debug!(%user_id, "expired session rejected");
            Err(LedgerError::Unauthenticated)
        }
        Some((user_id, _)) => Ok(user_id),
        None => Err(LedgerError::Unauthenticated),
    }
}

pub fn revoke_session(conn: &Connection, token: &str) -> LedgerResult<bool> {
    let removed = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        [hash_token(token.trim())],
    )?;
    Ok(removed > 0)
}

/// Succeeds only if `id` exists in the entity's table and belongs to `user_id`.
pub fn require_owned(conn: &Connection, entity: Owned, id: &str, user_id: &str) -> LedgerResult<()> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE id = ?1 AND user_id = ?2",
        entity.table()
    );

    let found: Option<i64> = conn
        .query_row(&sql, params![id, user_id], |row| row.get(0))
        .optional()?;

    found.map(|_| ()).ok_or(LedgerError::NotFound(entity.label()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::error::ErrorKind;
    use chrono::Duration;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_session_round_trip() {
        let conn = test_db();
        let user = create_user(&conn, "Ana@Example.com", Some("Ana")).unwrap();
        assert_eq!(user.email, "ana@example.com");

        let token = issue_session(&conn, &user.id, None).unwrap();
        assert_eq!(authenticate(&conn, &token).unwrap(), user.id);

        // The plain token is never stored
        let stored: String = conn
            .query_row("SELECT token_hash FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, token);
        assert_eq!(stored.len(), 64);

        assert!(revoke_session(&conn, &token).unwrap());
        assert_eq!(
            authenticate(&conn, &token).unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
    }

    #[test]
    fn test_unknown_and_expired_tokens_are_rejected() {
        let conn = test_db();
        let user = create_user(&conn, "bo@example.com", None).unwrap();
        let expired = issue_session(&conn, &user.id, Some(Utc::now() - Duration::hours(1))).unwrap();

        assert!(matches!(authenticate(&conn, "nope"), Err(LedgerError::Unauthenticated)));
        assert!(matches!(authenticate(&conn, ""), Err(LedgerError::Unauthenticated)));
        assert!(matches!(authenticate(&conn, &expired), Err(LedgerError::Unauthenticated)));
    }

    #[test]
    fn test_duplicate_email_is_invalid_input() {
        let conn = test_db();
        create_user(&conn, "cy@example.com", None).unwrap();
        let err = create_user(&conn, "CY@example.com", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(create_user(&conn, "not-an-email", None).is_err());
    }

    #[test]
    fn test_require_owned_hides_foreign_rows() {
        let conn = test_db();
        let owner = create_user(&conn, "owner@example.com", None).unwrap();
        let other = create_user(&conn, "other@example.com", None).unwrap();
        conn.execute(
            "INSERT INTO budgets (id, user_id, category, amount, period, created_at, updated_at)
             VALUES ('b1', ?1, 'Food', '100.00', 'monthly', 'x', 'x')",
            [&owner.id],
        )
        .unwrap();

        assert!(require_owned(&conn, Owned::Budget, "b1", &owner.id).is_ok());

        let foreign = require_owned(&conn, Owned::Budget, "b1", &other.id).unwrap_err();
        let missing = require_owned(&conn, Owned::Budget, "b2", &owner.id).unwrap_err();
        assert_eq!(foreign.to_string(), "Budget not found");
        assert_eq!(foreign.to_string(), missing.to_string());
    }
}
