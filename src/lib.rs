// Finance Ledger - Core Library
// Exposes all modules for use in the admin CLI, API server, and tests

pub mod db;
pub mod error;
pub mod money;
pub mod models;
pub mod auth;           // Users, bearer sessions, ownership checks
pub mod ledger;         // Income/expense entries + stats
pub mod payables;       // Bills and partial payments
pub mod budgets;        // Per-category budgets (upsert)
pub mod goals;          // Saving goals and contributions
pub mod notifications;  // In-app notifications + preferences
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use db::{open_database, setup_database};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use models::{
    Budget, BudgetPeriod, Flow, Frequency, LedgerEntry,
    Notification, NotificationPreference, Payable, Priority, SavingGoal,
};
pub use auth::{authenticate, create_user, issue_session, User};
pub use ledger::{LedgerStats, NewLedgerEntry};
pub use payables::{apply_payment, NewPayable, PayableFilter, PaymentResult, PaymentSummary};
pub use budgets::{upsert_budget, BudgetUpsert};
pub use goals::{contribute, ContributionResult, NewGoal};
pub use notifications::{mark_read, MarkRead, NewNotification, NotificationPage, PreferencesUpdate};
pub use config::ServerConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
