use bigdecimal::BigDecimal;
use std::fmt;

pub use crate::domain::chain::MONEY_SCALE;

pub const PAYMENT_METHOD_MAX_LEN: usize = 20;
pub const TRANSACTION_ID_MAX_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_user_id(user_id: i64) -> ValidationResult {
    if user_id <= 0 {
        return Err(ValidationError::new("user_id", "must be a positive integer"));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_money_scale(amount: &BigDecimal) -> ValidationResult {
    if &amount.with_scale(MONEY_SCALE) != amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", MONEY_SCALE),
        ));
    }

    Ok(())
}

/// Validates a payment method label and returns its sanitized form.
pub fn validate_payment_method(payment_method: &str) -> Result<String, ValidationError> {
    let payment_method = sanitize_string(payment_method);
    validate_required("payment_method", &payment_method)?;
    validate_max_len("payment_method", &payment_method, PAYMENT_METHOD_MAX_LEN)?;

    Ok(payment_method)
}

pub fn validate_transaction_id(transaction_id: &str) -> Result<String, ValidationError> {
    let transaction_id = transaction_id.trim().to_string();
    validate_required("transaction_id", &transaction_id)?;
    validate_max_len("transaction_id", &transaction_id, TRANSACTION_ID_MAX_LEN)?;

    Ok(transaction_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  credit\tcard  "), "credit card");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
        assert_eq!(sanitize_string("bank\r\ntransfer"), "bank transfer");
    }

    #[test]
    fn validates_user_id() {
        assert!(validate_user_id(1).is_ok());
        assert!(validate_user_id(0).is_err());
        assert!(validate_user_id(-4).is_err());
    }

    #[test]
    fn validates_positive_amount() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");

        assert!(validate_positive_amount(&positive).is_ok());
        assert!(validate_positive_amount(&BigDecimal::from(0)).is_err());
        assert!(validate_positive_amount(&BigDecimal::from(-1)).is_err());
    }

    #[test]
    fn validates_money_scale() {
        assert!(validate_money_scale(&BigDecimal::from_str("10.25").unwrap()).is_ok());
        assert!(validate_money_scale(&BigDecimal::from_str("10.5").unwrap()).is_ok());
        assert!(validate_money_scale(&BigDecimal::from(10)).is_ok());
        assert!(validate_money_scale(&BigDecimal::from_str("10.255").unwrap()).is_err());
    }

    #[test]
    fn validates_payment_method() {
        assert_eq!(validate_payment_method(" promptpay ").unwrap(), "promptpay");
        assert!(validate_payment_method("").is_err());
        assert!(validate_payment_method(&"x".repeat(21)).is_err());
    }

    #[test]
    fn validates_transaction_id() {
        assert_eq!(validate_transaction_id(" txn-1 ").unwrap(), "txn-1");
        assert!(validate_transaction_id("  ").is_err());
        assert!(validate_transaction_id(&"t".repeat(51)).is_err());
    }
}
