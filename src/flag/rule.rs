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

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProgressiveRollout, PERCENTAGE_MULTIPLIER};
use crate::bucketing::build_hash;
use crate::errors::{EvaluationError, Result};
use crate::query;
use crate::utils::str_trim;

/// One targeting clause of a flag.
///
/// The `query` decides whether the rule applies to a context; exactly one of
/// the three result producers decides the variation, with precedence
/// `progressive_rollout` > `percentages` > `variation_result`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Mandatory if the rule should be updatable by a scheduled step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Targeting query; ignored on the default rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Fixed variation served when the rule applies. Ignored when a
    /// percentage or progressive rollout is configured.
    #[serde(rename = "variation", skip_serializing_if = "Option::is_none")]
    pub variation_result: Option<String>,

    /// Percentage split between variations, e.g. `{"A": 10, "B": 90}`.
    #[serde(rename = "percentage", skip_serializing_if = "Option::is_none")]
    pub percentages: Option<HashMap<String, f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progressive_rollout: Option<ProgressiveRollout>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
}

impl Rule {
    /// True if the rule's producer needs a bucketing key (percentage split
    /// or progressive rollout).
    pub fn requires_bucketing(&self) -> bool {
        !self.get_percentages().is_empty() || self.progressive_rollout.is_some()
    }

    /// Checks if the rule applies to the context and, if so, returns the
    /// variation name to serve.
    ///
    /// Returns [`EvaluationError::RuleNotApply`] when the query does not
    /// match or the rule is disabled; any other error is a configuration
    /// fault that aborts the whole flag evaluation.
    pub(crate) fn evaluate(
        &self,
        key: &str,
        context: &HashMap<String, Value>,
        flag_name: &str,
        is_default: bool,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if key.is_empty() && self.requires_bucketing() {
            return Err(EvaluationError::MissingBucketingKeyForRule);
        }

        let applies = is_default || query::evaluate(&self.trimmed_query(), context);
        if !applies || (!is_default && self.is_disable()) {
            return Err(EvaluationError::RuleNotApply);
        }

        if let Some(rollout) = &self.progressive_rollout {
            return self.evaluate_progressive_rollout(rollout, key, flag_name, now);
        }
        if !self.get_percentages().is_empty() {
            return self.evaluate_percentage_rollout(key, flag_name);
        }
        if let Some(variation) = &self.variation_result {
            return Ok(variation.clone());
        }
        Err(EvaluationError::NoResultProducer)
    }

    /// True if the rule's outcome is not a single guaranteed variation:
    /// a progressive rollout, or a percentage split where no variation
    /// holds 100%.
    pub fn is_dynamic(&self) -> bool {
        let percentages = self.get_percentages();
        let has_full_percentage = percentages.values().any(|pct| *pct == 100.0);
        self.progressive_rollout.is_some() || (!percentages.is_empty() && !has_full_percentage)
    }

    fn evaluate_percentage_rollout(&self, key: &str, flag_name: &str) -> Result<String> {
        let percentages = self.get_percentages();

        // The map has no stable order, and the bucket layout must be
        // identical in every port sharing the flag store. Reverse
        // lexicographic order is the published contract (it keeps "true"
        // before "false" for boolean flags).
        let mut names: Vec<&String> = percentages.keys().collect();
        names.sort_unstable_by(|a, b| b.cmp(a));

        let total: f64 = percentages.values().sum();
        let hash = build_hash(flag_name, key, (total * PERCENTAGE_MULTIPLIER) as u32);

        let mut bucket_start = 0.0_f64;
        for name in names {
            let bucket_end = bucket_start + percentages[name] * PERCENTAGE_MULTIPLIER;
            if bucket_start as u32 <= hash && hash < bucket_end as u32 {
                return Ok(name.clone());
            }
            bucket_start = bucket_end;
        }
        Err(EvaluationError::BucketNotFound)
    }

    fn evaluate_progressive_rollout(
        &self,
        rollout: &ProgressiveRollout,
        key: &str,
        flag_name: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let (initial, end) = match (&rollout.initial, &rollout.end) {
            (Some(initial), Some(end)) => (initial, end),
            _ => return Err(EvaluationError::InvalidProgressiveRollout),
        };
        let (initial_date, end_date) = match (initial.date, end.date) {
            (Some(initial_date), Some(end_date)) if end_date > initial_date => {
                (initial_date, end_date)
            }
            _ => return Err(EvaluationError::InvalidProgressiveRollout),
        };
        if initial.variation.is_none() || end.variation.is_none() {
            return Err(EvaluationError::InvalidProgressiveRollout);
        }

        if now < initial_date {
            return Ok(initial.get_variation().to_string());
        }
        if now >= end_date {
            return Ok(end.get_variation().to_string());
        }

        let initial_percentage = initial.get_percentage() * PERCENTAGE_MULTIPLIER;
        let end_percentage = match end.get_percentage() {
            pct if pct == 0.0 || pct > 100.0 => 100.0,
            pct => pct,
        } * PERCENTAGE_MULTIPLIER;

        let ramp_seconds = (end_date - initial_date).num_seconds() as f64;
        let percent_per_second = (end_percentage - initial_percentage) / ramp_seconds;
        let elapsed = (now - initial_date).num_seconds() as f64;
        let current_percentage = elapsed * percent_per_second + initial_percentage;

        let hash = build_hash(flag_name, key, (100.0 * PERCENTAGE_MULTIPLIER) as u32);
        // Strict comparison: a subject whose hash equals the current
        // percentage stays on the initial variation.
        if hash < current_percentage as u32 {
            Ok(end.get_variation().to_string())
        } else {
            Ok(initial.get_variation().to_string())
        }
    }

    /// Field-merge used by the scheduled-rollout compiler: any field present
    /// in the update replaces the original, except `percentages`, where keys
    /// are merged individually and a negative value deletes the key.
    pub(crate) fn merge(&mut self, update: &Rule) {
        if update.disable.is_some() {
            self.disable = update.disable;
        }
        if update.query.is_some() {
            self.query = update.query.clone();
        }
        if update.variation_result.is_some() {
            self.variation_result = update.variation_result.clone();
        }
        if let Some(update_rollout) = &update.progressive_rollout {
            let mut rollout = self.progressive_rollout.clone().unwrap_or_default();
            if let Some(update_initial) = &update_rollout.initial {
                rollout
                    .initial
                    .get_or_insert_with(Default::default)
                    .merge(update_initial);
            }
            if let Some(update_end) = &update_rollout.end {
                rollout
                    .end
                    .get_or_insert_with(Default::default)
                    .merge(update_end);
            }
            self.progressive_rollout = Some(rollout);
        }
        if let Some(update_percentages) = &update.percentages {
            let mut merged = self.get_percentages().clone();
            for (name, percentage) in update_percentages {
                if *percentage < 0.0 {
                    merged.remove(name);
                } else {
                    merged.insert(name.clone(), *percentage);
                }
            }
            self.percentages = Some(merged);
        }
    }

    /// Merges a set of scheduled-step rule updates into an existing rule
    /// collection: updates are matched to existing rules by name and
    /// field-merged; unnamed or unmatched updates are appended as new rules.
    pub(crate) fn merge_rule_sets(initial: &[Rule], updates: &[Rule]) -> Vec<Rule> {
        let mut collection = initial.to_vec();

        let updates_by_name: HashMap<&str, &Rule> = updates
            .iter()
            .filter_map(|update| update.name.as_deref().map(|name| (name, update)))
            .collect();

        let mut merged_names: Vec<String> = Vec::new();
        for rule in collection.iter_mut() {
            let name = rule.get_name().to_string();
            if let Some(update) = updates_by_name.get(name.as_str()) {
                rule.merge(update);
                merged_names.push(name);
            }
        }

        for update in updates {
            if !merged_names.iter().any(|name| name == update.get_name()) {
                collection.push(update.clone());
            }
        }
        collection
    }

    pub fn get_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn get_query(&self) -> &str {
        self.query.as_deref().unwrap_or("")
    }

    /// The query with line breaks collapsed, as fed to the dialect
    /// classifier and the evaluators.
    pub(crate) fn trimmed_query(&self) -> String {
        str_trim(self.get_query())
    }

    pub fn is_disable(&self) -> bool {
        self.disable.unwrap_or(false)
    }

    pub fn get_percentages(&self) -> &HashMap<String, f64> {
        static EMPTY: OnceLock<HashMap<String, f64>> = OnceLock::new();
        self.percentages
            .as_ref()
            .unwrap_or_else(|| EMPTY.get_or_init(HashMap::new))
    }
}
