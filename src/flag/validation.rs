// (C) Copyright 2025 flagcore contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration linting, run when a flag set is loaded. Evaluation itself
//! never calls this: a faulty flag degrades to the SDK default at evaluation
//! time instead of failing the whole flag set.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;

use super::{InternalFlag, Rule};
use crate::query;
use crate::utils::json_type;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no variation available for the flag")]
    NoVariations,

    #[error("variation \"{0}\" has no value")]
    NullVariation(String),

    #[error("all variations must share one type: \"{variation}\" is {found}, expected {expected}")]
    MixedVariationTypes {
        variation: String,
        found: &'static str,
        expected: &'static str,
    },

    #[error("missing default rule")]
    MissingDefaultRule,

    #[error("duplicated rule name: \"{0}\"")]
    DuplicatedRuleName(String),

    #[error("{rule} has no query")]
    MissingQuery { rule: String },

    #[error("{rule} has an invalid query: {reason}")]
    InvalidQuery { rule: String, reason: String },

    #[error("{rule} has no variation to serve")]
    NoResultProducer { rule: String },

    #[error("{rule} has an empty percentage split")]
    EmptyPercentages { rule: String },

    #[error("{rule} references unknown variation \"{variation}\"")]
    UnknownVariation { rule: String, variation: String },

    #[error("{rule} has an invalid progressive rollout: {reason}")]
    InvalidProgressiveRollout { rule: String, reason: String },
}

impl InternalFlag {
    /// Lints the flag configuration, reporting the first fault found.
    pub fn is_valid(&self) -> Result<(), ValidationError> {
        let variations = self
            .variations
            .as_ref()
            .filter(|variations| !variations.is_empty())
            .ok_or(ValidationError::NoVariations)?;

        let mut expected: Option<&'static str> = None;
        for (name, value) in variations {
            if value.is_null() {
                return Err(ValidationError::NullVariation(name.clone()));
            }
            let found = json_type(value);
            match expected {
                None => expected = Some(found),
                Some(expected_type) if expected_type != found => {
                    return Err(ValidationError::MixedVariationTypes {
                        variation: name.clone(),
                        found,
                        expected: expected_type,
                    });
                }
                _ => {}
            }
        }

        let default_rule = self
            .default_rule
            .as_ref()
            .ok_or(ValidationError::MissingDefaultRule)?;
        validate_rule(default_rule, true, variations, "default rule")?;

        let mut seen_names: HashSet<&str> = HashSet::new();
        for (index, rule) in self.get_rules().iter().enumerate() {
            let label = if rule.get_name().is_empty() {
                format!("rule {index}")
            } else {
                format!("rule \"{}\"", rule.get_name())
            };
            validate_rule(rule, false, variations, &label)?;
            if !rule.get_name().is_empty() && !seen_names.insert(rule.get_name()) {
                return Err(ValidationError::DuplicatedRuleName(
                    rule.get_name().to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn validate_rule(
    rule: &Rule,
    is_default: bool,
    variations: &HashMap<String, Value>,
    label: &str,
) -> Result<(), ValidationError> {
    // A disabled targeting rule can never be selected, its content is moot.
    if !is_default && rule.is_disable() {
        return Ok(());
    }

    if !is_default {
        if rule.query.is_none() {
            return Err(ValidationError::MissingQuery {
                rule: label.to_string(),
            });
        }
        query::validate(&rule.trimmed_query()).map_err(|reason| ValidationError::InvalidQuery {
            rule: label.to_string(),
            reason,
        })?;
    }

    if let Some(rollout) = &rule.progressive_rollout {
        let check = |ok: bool, reason: &str| {
            if ok {
                Ok(())
            } else {
                Err(ValidationError::InvalidProgressiveRollout {
                    rule: label.to_string(),
                    reason: reason.to_string(),
                })
            }
        };
        let (initial, end) = match (&rollout.initial, &rollout.end) {
            (Some(initial), Some(end)) => (initial, end),
            _ => return check(false, "missing initial or end step"),
        };
        check(
            initial.variation.is_some() && end.variation.is_some(),
            "missing variation on a step",
        )?;
        for variation in [initial.get_variation(), end.get_variation()] {
            if !variations.contains_key(variation) {
                return Err(ValidationError::UnknownVariation {
                    rule: label.to_string(),
                    variation: variation.to_string(),
                });
            }
        }
        let dates_ordered = match (initial.date, end.date) {
            (Some(initial_date), Some(end_date)) => end_date > initial_date,
            _ => false,
        };
        check(dates_ordered, "end date must be after the initial date")?;
        check(
            initial.get_percentage() <= end.get_percentage() || end.get_percentage() == 0.0,
            "initial percentage must not exceed the end percentage",
        )?;
        return Ok(());
    }

    if let Some(percentages) = &rule.percentages {
        let total: f64 = percentages.values().sum();
        if percentages.is_empty() || total <= 0.0 {
            return Err(ValidationError::EmptyPercentages {
                rule: label.to_string(),
            });
        }
        for variation in percentages.keys() {
            if !variations.contains_key(variation) {
                return Err(ValidationError::UnknownVariation {
                    rule: label.to_string(),
                    variation: variation.clone(),
                });
            }
        }
        return Ok(());
    }

    match &rule.variation_result {
        Some(variation) if variations.contains_key(variation) => Ok(()),
        Some(variation) => Err(ValidationError::UnknownVariation {
            rule: label.to_string(),
            variation: variation.clone(),
        }),
        None => Err(ValidationError::NoResultProducer {
            rule: label.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{ProgressiveRollout, ProgressiveRolloutStep};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn valid_flag() -> InternalFlag {
        InternalFlag {
            variations: Some(HashMap::from([
                ("enabled".to_string(), json!(true)),
                ("disabled".to_string(), json!(false)),
            ])),
            rules: Some(vec![Rule {
                name: Some("beta".to_string()),
                query: Some("beta eq true".to_string()),
                variation_result: Some("enabled".to_string()),
                ..Default::default()
            }]),
            default_rule: Some(Rule {
                variation_result: Some("disabled".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_flag() {
        assert_eq!(valid_flag().is_valid(), Ok(()));
    }

    #[test]
    fn test_no_variations() {
        let flag = InternalFlag::default();
        assert_eq!(flag.is_valid(), Err(ValidationError::NoVariations));
        let empty = InternalFlag {
            variations: Some(HashMap::new()),
            ..Default::default()
        };
        assert_eq!(empty.is_valid(), Err(ValidationError::NoVariations));
    }

    #[test]
    fn test_null_variation_value() {
        let flag = InternalFlag {
            variations: Some(HashMap::from([("enabled".to_string(), Value::Null)])),
            ..valid_flag()
        };
        assert_eq!(
            flag.is_valid(),
            Err(ValidationError::NullVariation("enabled".to_string()))
        );
    }

    #[test]
    fn test_mixed_variation_types() {
        let flag = InternalFlag {
            variations: Some(HashMap::from([
                ("enabled".to_string(), json!(true)),
                ("disabled".to_string(), json!("false")),
            ])),
            ..valid_flag()
        };
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::MixedVariationTypes { .. })
        ));
    }

    #[test]
    fn test_missing_default_rule() {
        let flag = InternalFlag {
            default_rule: None,
            ..valid_flag()
        };
        assert_eq!(flag.is_valid(), Err(ValidationError::MissingDefaultRule));
    }

    #[test]
    fn test_duplicated_rule_name() {
        let mut flag = valid_flag();
        flag.rules.as_mut().unwrap().push(Rule {
            name: Some("beta".to_string()),
            query: Some("admin eq true".to_string()),
            variation_result: Some("enabled".to_string()),
            ..Default::default()
        });
        assert_eq!(
            flag.is_valid(),
            Err(ValidationError::DuplicatedRuleName("beta".to_string()))
        );
    }

    #[test]
    fn test_targeting_rule_requires_query() {
        let mut flag = valid_flag();
        flag.rules.as_mut().unwrap()[0].query = None;
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::MissingQuery { .. })
        ));
    }

    #[test]
    fn test_invalid_query_is_reported() {
        let mut flag = valid_flag();
        flag.rules.as_mut().unwrap()[0].query = Some("beta eq".to_string());
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_disabled_rule_is_not_linted() {
        let mut flag = valid_flag();
        flag.rules.as_mut().unwrap()[0] = Rule {
            disable: Some(true),
            ..Default::default()
        };
        assert_eq!(flag.is_valid(), Ok(()));
    }

    #[test]
    fn test_rule_without_result_producer() {
        let flag = InternalFlag {
            default_rule: Some(Rule::default()),
            ..valid_flag()
        };
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::NoResultProducer { .. })
        ));
    }

    #[test]
    fn test_zero_sum_percentages() {
        let flag = InternalFlag {
            default_rule: Some(Rule {
                percentages: Some(HashMap::from([
                    ("enabled".to_string(), 0.0),
                    ("disabled".to_string(), 0.0),
                ])),
                ..Default::default()
            }),
            ..valid_flag()
        };
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::EmptyPercentages { .. })
        ));
    }

    #[test]
    fn test_percentage_references_unknown_variation() {
        let flag = InternalFlag {
            default_rule: Some(Rule {
                percentages: Some(HashMap::from([("typo".to_string(), 100.0)])),
                ..Default::default()
            }),
            ..valid_flag()
        };
        assert_eq!(
            flag.is_valid(),
            Err(ValidationError::UnknownVariation {
                rule: "default rule".to_string(),
                variation: "typo".to_string(),
            })
        );
    }

    #[test]
    fn test_progressive_rollout_date_order() {
        let now = Utc::now();
        let flag = InternalFlag {
            default_rule: Some(Rule {
                progressive_rollout: Some(ProgressiveRollout {
                    initial: Some(ProgressiveRolloutStep {
                        variation: Some("disabled".to_string()),
                        percentage: Some(0.0),
                        date: Some(now + Duration::hours(1)),
                    }),
                    end: Some(ProgressiveRolloutStep {
                        variation: Some("enabled".to_string()),
                        percentage: Some(100.0),
                        date: Some(now),
                    }),
                }),
                ..Default::default()
            }),
            ..valid_flag()
        };
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::InvalidProgressiveRollout { .. })
        ));
    }

    #[test]
    fn test_progressive_rollout_percentage_order() {
        let now = Utc::now();
        let flag = InternalFlag {
            default_rule: Some(Rule {
                progressive_rollout: Some(ProgressiveRollout {
                    initial: Some(ProgressiveRolloutStep {
                        variation: Some("disabled".to_string()),
                        percentage: Some(80.0),
                        date: Some(now),
                    }),
                    end: Some(ProgressiveRolloutStep {
                        variation: Some("enabled".to_string()),
                        percentage: Some(20.0),
                        date: Some(now + Duration::hours(1)),
                    }),
                }),
                ..Default::default()
            }),
            ..valid_flag()
        };
        assert!(matches!(
            flag.is_valid(),
            Err(ValidationError::InvalidProgressiveRollout { .. })
        ));
    }
}
