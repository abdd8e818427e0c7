//! Error taxonomy for rule evaluation.
//!
//! Row-level data problems never surface here: they exclude the row and are counted.
//! Everything in [`EngineError`] aborts the evaluation it belongs to.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The table lacks columns the rule declares as required.
    #[error("rule `{rule}` is missing required columns: {}", .missing.join(", "))]
    MissingColumns { rule: String, missing: Vec<String> },

    /// The rule definition itself is inconsistent.
    #[error("rule `{rule}` is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },

    /// The cancellation token fired between partitions or buckets.
    #[error("evaluation of rule `{rule}` was cancelled")]
    Cancelled { rule: String },

    /// Anything unexpected raised while grouping, including panics.
    #[error("internal error while evaluating rule `{rule}`: {message}")]
    Internal { rule: String, message: String },

    #[error("malformed table: {0}")]
    Table(String),
}

impl EngineError {
    pub fn missing_columns(rule: &str, missing: Vec<String>) -> Self {
        Self::MissingColumns {
            rule: rule.to_string(),
            missing,
        }
    }

    pub fn invalid_rule(rule: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }

    pub fn internal(rule: &str, message: impl Into<String>) -> Self {
        Self::Internal {
            rule: rule.to_string(),
            message: message.into(),
        }
    }

    pub fn is_schema_error(&self) -> bool {
        matches!(self, Self::MissingColumns { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_names() {
        let err = EngineError::missing_columns(
            "same-recipient-phone",
            vec!["buyer_id".to_string(), "recipient_phone_".to_string()],
        );
        assert!(err.is_schema_error());
        assert_eq!(
            err.to_string(),
            "rule `same-recipient-phone` is missing required columns: buyer_id, recipient_phone_"
        );
    }
}
