// 🚦 Ledger Errors - one typed error for every operation
//
// Absent rows and rows owned by another user are both reported as NotFound,
// so callers cannot discover other users' data.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Payable is already fully paid")]
    AlreadySettled,

    #[error("Payment amount exceeds remaining balance of {remaining}")]
    ExceedsRemaining { remaining: Decimal },

    #[error("Saving goal is already reached")]
    GoalReached,

    #[error("Contribution exceeds the {remaining} left to reach the goal")]
    ExceedsTarget { remaining: Decimal },

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the HTTP layer and by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthenticated,
    NotFound,
    AlreadySettled,
    ExceedsRemaining,
    Internal,
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
            LedgerError::Unauthenticated => ErrorKind::Unauthenticated,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::AlreadySettled | LedgerError::GoalReached => ErrorKind::AlreadySettled,
            LedgerError::ExceedsRemaining { .. } | LedgerError::ExceedsTarget { .. } => {
                ErrorKind::ExceedsRemaining
            }
            LedgerError::Storage(_) | LedgerError::Corrupt(_) | LedgerError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status class for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::AlreadySettled | ErrorKind::ExceedsRemaining => {
                400
            }
            ErrorKind::Unauthenticated => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_codes() {
        assert_eq!(LedgerError::invalid("bad").status_code(), 400);
        assert_eq!(LedgerError::Unauthenticated.status_code(), 401);
        assert_eq!(LedgerError::NotFound("Payable").status_code(), 404);
        assert_eq!(LedgerError::AlreadySettled.status_code(), 400);
        assert_eq!(LedgerError::GoalReached.status_code(), 400);
        assert_eq!(LedgerError::Corrupt("x".into()).status_code(), 500);
    }

    #[test]
    fn test_exceeds_remaining_message_reports_remaining() {
        let err = LedgerError::ExceedsRemaining {
            remaining: Decimal::from_str("10.00").unwrap(),
        };
        assert_eq!(err.kind(), ErrorKind::ExceedsRemaining);
        assert_eq!(
            err.to_string(),
            "Payment amount exceeds remaining balance of 10.00"
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = LedgerError::Internal("mutex poisoned".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(LedgerError::NotFound("Budget").public_message(), "Budget not found");
    }
}
