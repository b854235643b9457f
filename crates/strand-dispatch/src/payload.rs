//! Typed execution parameters carried by a task record.
//!
//! Target and trigger data are tagged variants validated at the submission
//! boundary, so a malformed submission is rejected before it ever reaches a
//! stream. Performers consume these structures verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What the performer executes: the target call and its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetData {
    /// Chain the target contract lives on.
    pub chain_id: String,
    /// Address of the target contract.
    pub contract_address: String,
    /// Function to invoke on the target.
    pub function: String,
    /// Statically-provided call arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Script that computes arguments at execution time, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_arguments_url: Option<String>,
    /// Hard expiry after which the performer must not execute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TargetData {
    /// Validates the target at the submission boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubmission`] when a required field is empty.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(Error::InvalidSubmission {
                message: "target chain_id is empty".into(),
            });
        }
        if self.contract_address.is_empty() {
            return Err(Error::InvalidSubmission {
                message: "target contract_address is empty".into(),
            });
        }
        if self.function.is_empty() {
            return Err(Error::InvalidSubmission {
                message: "target function is empty".into(),
            });
        }
        Ok(())
    }
}

/// Why the task fired: one variant per scheduler kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TriggerData {
    /// Fired by the time scheduler (interval or cron).
    #[serde(rename_all = "camelCase")]
    Time {
        /// Seconds between firings for interval schedules.
        interval_seconds: i64,
        /// Cron expression for cron schedules, when used instead of an
        /// interval.
        #[serde(skip_serializing_if = "Option::is_none")]
        cron_expression: Option<String>,
        /// The firing this task corresponds to.
        next_execution_at: DateTime<Utc>,
    },

    /// Fired by the event scheduler observing a contract event.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Chain the trigger event was observed on.
        chain_id: String,
        /// Contract that emitted the trigger event.
        contract_address: String,
        /// Name of the trigger event.
        event_name: String,
        /// Transaction that carried the event, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
    },

    /// Fired by the condition scheduler when a watched value crossed its
    /// limits.
    #[serde(rename_all = "camelCase")]
    Condition {
        /// Kind of comparison the scheduler evaluated.
        condition_type: String,
        /// Source the watched value was read from.
        source_url: String,
        /// Upper limit of the watched range.
        upper_limit: f64,
        /// Lower limit of the watched range.
        lower_limit: f64,
        /// The value that satisfied the condition, when reported.
        #[serde(skip_serializing_if = "Option::is_none")]
        satisfied_value: Option<f64>,
    },
}

impl TriggerData {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Time { .. } => "time",
            Self::Event { .. } => "event",
            Self::Condition { .. } => "condition",
        }
    }

    /// Validates the trigger at the submission boundary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubmission`] when the variant's fields are
    /// inconsistent or empty.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Time {
                interval_seconds,
                cron_expression,
                ..
            } => {
                if *interval_seconds <= 0 && cron_expression.is_none() {
                    return Err(Error::InvalidSubmission {
                        message: "time trigger needs a positive interval or a cron expression"
                            .into(),
                    });
                }
            }
            Self::Event {
                chain_id,
                contract_address,
                event_name,
                ..
            } => {
                if chain_id.is_empty() || contract_address.is_empty() || event_name.is_empty() {
                    return Err(Error::InvalidSubmission {
                        message: "event trigger has empty chain, contract, or event name".into(),
                    });
                }
            }
            Self::Condition {
                condition_type,
                source_url,
                upper_limit,
                lower_limit,
                ..
            } => {
                if condition_type.is_empty() || source_url.is_empty() {
                    return Err(Error::InvalidSubmission {
                        message: "condition trigger has empty type or source".into(),
                    });
                }
                if upper_limit < lower_limit {
                    return Err(Error::InvalidSubmission {
                        message: format!(
                            "condition limits are inverted: upper {upper_limit} < lower {lower_limit}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetData {
        TargetData {
            chain_id: "11155111".into(),
            contract_address: "0xabc".into(),
            function: "execute()".into(),
            arguments: vec!["1".into()],
            dynamic_arguments_url: None,
            expires_at: None,
        }
    }

    #[test]
    fn valid_target_passes() {
        assert!(target().validate().is_ok());
    }

    #[test]
    fn empty_function_is_rejected() {
        let mut t = target();
        t.function = String::new();
        assert!(t.validate().is_err());
    }

    #[test]
    fn trigger_serializes_with_kind_tag() {
        let trigger = TriggerData::Event {
            chain_id: "1".into(),
            contract_address: "0xdef".into(),
            event_name: "PriceUpdated".into(),
            tx_hash: None,
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(json["eventName"], "PriceUpdated");
    }

    #[test]
    fn inverted_condition_limits_are_rejected() {
        let trigger = TriggerData::Condition {
            condition_type: "range".into(),
            source_url: "https://example.com/price".into(),
            upper_limit: 1.0,
            lower_limit: 2.0,
            satisfied_value: None,
        };
        assert!(trigger.validate().is_err());
    }

    #[test]
    fn time_trigger_accepts_cron_without_interval() {
        let trigger = TriggerData::Time {
            interval_seconds: 0,
            cron_expression: Some("0 * * * *".into()),
            next_execution_at: Utc::now(),
        };
        assert!(trigger.validate().is_ok());
    }
}
