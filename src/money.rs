// 💵 Money - fixed-point amounts with two-place semantics
//
// Amounts live in SQLite as TEXT ("300.00") and in memory as Decimal.
// Binary floating point never touches a monetary value.

use crate::error::{LedgerError, LedgerResult};
use crate::db::conversion_error;
use rusqlite::Row;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Number of fractional digits every stored amount carries.
pub const SCALE: u32 = 2;

/// Largest amount accepted from a caller (one trillion).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Rescale to exactly two places (caller guarantees no digits are lost).
pub fn to_cents(amount: Decimal) -> Decimal {
    let mut scaled = amount.round_dp(SCALE);
    scaled.rescale(SCALE);
    scaled
}

/// Validate a user-supplied amount: strictly positive, at most two decimals,
/// no larger than `MAX_AMOUNT`.
pub fn validate_positive(amount: Decimal, field: &str) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid(format!(
            "{} must be greater than zero",
            field
        )));
    }

    if amount > MAX_AMOUNT {
        return Err(LedgerError::invalid(format!(
            "{} must not exceed {}",
            field, MAX_AMOUNT
        )));
    }

    if amount.normalize().scale() > SCALE {
        return Err(LedgerError::invalid(format!(
            "{} must have at most {} decimal places",
            field, SCALE
        )));
    }

    Ok(to_cents(amount))
}

/// Format for persistence.
pub fn to_sql(amount: Decimal) -> String {
    to_cents(amount).to_string()
}

/// Parse a persisted amount column.
pub fn from_sql(raw: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(raw)
        .map(to_cents)
        .map_err(|e| LedgerError::Corrupt(format!("invalid amount '{}': {}", raw, e)))
}

/// Read a TEXT amount column inside a row mapper.
pub fn amount_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    from_sql(&raw).map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_validate_positive_accepts_whole_and_cents() {
        assert_eq!(validate_positive(d("100"), "amount").unwrap().to_string(), "100.00");
        assert_eq!(validate_positive(d("0.01"), "amount").unwrap(), d("0.01"));
        // Trailing zeros beyond two places are not real precision
        assert_eq!(validate_positive(d("12.5000"), "amount").unwrap().to_string(), "12.50");
    }

    #[test]
    fn test_validate_positive_rejects_zero_negative_and_sub_cent() {
        assert!(validate_positive(Decimal::ZERO, "amount").is_err());
        assert!(validate_positive(d("-5"), "amount").is_err());

        let err = validate_positive(d("0.001"), "amount").unwrap_err();
        assert_eq!(err.to_string(), "amount must have at most 2 decimal places");
    }

    #[test]
    fn test_validate_positive_rejects_amounts_above_ceiling() {
        assert_eq!(MAX_AMOUNT, d("1000000000000"));
        assert!(validate_positive(MAX_AMOUNT, "amount").is_ok());

        let err = validate_positive(d("1000000000000.01"), "amount").unwrap_err();
        assert_eq!(err.to_string(), "amount must not exceed 1000000000000");
        assert!(validate_positive(d("50000000000000000000000000000"), "amount").is_err());
    }

    #[test]
    fn test_sql_text_format() {
        assert_eq!(to_sql(d("300")), "300.00");
        assert_eq!(from_sql("40.5").unwrap().to_string(), "40.50");
        assert!(from_sql("forty").is_err());
    }

    #[test]
    fn test_no_drift_over_many_installments() {
        let mut total = Decimal::ZERO;
        for _ in 0..10 {
            total += d("0.10");
        }
        assert_eq!(total, d("1.00"));
    }
}
