// 🧾 Domain Models - payables, ledger entries, budgets, saving goals, notifications
//
// Every entity is owned by exactly one user (user_id). JSON uses camelCase
// field names; Decimal amounts serialize as strings ("300.00").

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

// ============================================================================
// PAYABLE
// ============================================================================

/// A debt or bill the user owes, tracked with partial-payment progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payable {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub is_paid: bool,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payable {
    /// Outstanding balance, never negative.
    pub fn remaining(&self) -> Decimal {
        crate::money::to_cents((self.amount - self.paid_amount).max(Decimal::ZERO))
    }
}

// ============================================================================
// LEDGER ENTRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Income,
    Expense,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::Income => "income",
            Flow::Expense => "expense",
        }
    }
}

impl FromStr for Flow {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Flow::Income),
            "expense" => Ok(Flow::Expense),
            other => Err(LedgerError::invalid(format!(
                "flow must be 'income' or 'expense', got '{}'",
                other
            ))),
        }
    }
}

/// A money movement. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub flow: Flow,
    pub category: String,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// BUDGET
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetPeriod::Weekly => "weekly",
            BudgetPeriod::Monthly => "monthly",
            BudgetPeriod::Quarterly => "quarterly",
            BudgetPeriod::Yearly => "yearly",
        }
    }
}

impl FromStr for BudgetPeriod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(BudgetPeriod::Weekly),
            "monthly" => Ok(BudgetPeriod::Monthly),
            "quarterly" => Ok(BudgetPeriod::Quarterly),
            "yearly" => Ok(BudgetPeriod::Yearly),
            other => Err(LedgerError::invalid(format!("unknown budget period '{}'", other))),
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spending ceiling for one category over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub amount: Decimal,
    pub period: BudgetPeriod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// SAVING GOAL
// ============================================================================

/// Money the user is putting aside toward a target, optionally by a deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingGoal {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub deadline: Option<NaiveDate>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavingGoal {
    /// Amount still to save, never negative.
    pub fn remaining(&self) -> Decimal {
        crate::money::to_cents((self.target_amount - self.current_amount).max(Decimal::ZERO))
    }
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(LedgerError::invalid(format!("unknown priority '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub priority: Priority,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Immediate,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl FromStr for Frequency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Frequency::Immediate),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(LedgerError::invalid(format!("unknown frequency '{}'", other))),
        }
    }
}

/// Per-user delivery settings. Created with defaults on first read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreference {
    pub user_id: String,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub in_app_enabled: bool,
    pub budget_alerts: bool,
    pub bill_reminders: bool,
    pub goal_updates: bool,
    pub frequency: Frequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    /// All channels and alerts on, immediate delivery.
    pub fn defaults(user_id: &str, now: DateTime<Utc>) -> Self {
        NotificationPreference {
            user_id: user_id.to_string(),
            email_enabled: true,
            push_enabled: true,
            in_app_enabled: true,
            budget_alerts: true,
            bill_reminders: true,
            goal_updates: true,
            frequency: Frequency::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_forms() {
        assert_eq!("monthly".parse::<BudgetPeriod>().unwrap(), BudgetPeriod::Monthly);
        assert_eq!(BudgetPeriod::default(), BudgetPeriod::Monthly);
        assert_eq!(Priority::default().as_str(), "normal");
        assert_eq!("expense".parse::<Flow>().unwrap(), Flow::Expense);
        assert!("fortnightly".parse::<BudgetPeriod>().is_err());
        assert!("transfer".parse::<Flow>().is_err());
    }

    #[test]
    fn test_payable_serializes_camel_case_with_decimal_strings() {
        let now = Utc::now();
        let payable = Payable {
            id: "p1".into(),
            user_id: "u1".into(),
            name: "Car loan".into(),
            category: "Auto".into(),
            description: None,
            amount: Decimal::new(30000, 2),
            paid_amount: Decimal::new(10000, 2),
            is_paid: false,
            due_date: None,
            paid_date: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&payable).unwrap();
        assert_eq!(json["paidAmount"], "100.00");
        assert_eq!(json["isPaid"], false);
        assert_eq!(payable.remaining(), Decimal::new(20000, 2));
    }

    #[test]
    fn test_default_preferences_enable_everything() {
        let prefs = NotificationPreference::defaults("u1", Utc::now());
        assert!(prefs.email_enabled && prefs.push_enabled && prefs.in_app_enabled);
        assert!(prefs.budget_alerts && prefs.bill_reminders && prefs.goal_updates);
        assert_eq!(prefs.frequency, Frequency::Immediate);
    }
}
