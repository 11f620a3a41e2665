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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Rule;

/// A time-ramped linear transition of bucketing odds between two variations.
///
/// Before `initial.date` every subject gets the initial variation; at or
/// after `end.date` every subject gets the end variation; in between, the
/// share of subjects on the end variation grows linearly with elapsed time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveRollout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<ProgressiveRolloutStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<ProgressiveRolloutStep>,
}

/// One endpoint of a progressive rollout ramp.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveRolloutStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl ProgressiveRolloutStep {
    pub(crate) fn get_percentage(&self) -> f64 {
        self.percentage.unwrap_or(0.0)
    }

    pub(crate) fn get_variation(&self) -> &str {
        self.variation.as_deref().unwrap_or("")
    }

    /// Field-merge used by the scheduled-rollout compiler.
    pub(crate) fn merge(&mut self, update: &ProgressiveRolloutStep) {
        if update.variation.is_some() {
            self.variation = update.variation.clone();
        }
        if update.percentage.is_some() {
            self.percentage = update.percentage;
        }
        if update.date.is_some() {
            self.date = update.date;
        }
    }
}

/// A start/end window outside of which the flag behaves as disabled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentationRollout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// A dated partial flag override, folded into the flag by the scheduled
/// compiler once its date is reached.
///
/// This is deliberately a separate type from `InternalFlag`, holding only the
/// overridable fields: a step cannot carry its own `scheduledRollout`, so
/// scheduling is one level deep by construction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variations: Option<HashMap<String, Value>>,
    #[serde(rename = "targeting", skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<Rule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimentation: Option<ExperimentationRollout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ScheduledStep {
    pub(crate) fn get_rules(&self) -> &[Rule] {
        self.rules.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_progressive_step_merge() {
        let mut step = ProgressiveRolloutStep {
            variation: Some("A".to_string()),
            percentage: Some(10.0),
            date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        };
        step.merge(&ProgressiveRolloutStep {
            variation: None,
            percentage: Some(50.0),
            date: None,
        });
        assert_eq!(step.variation.as_deref(), Some("A"));
        assert_eq!(step.percentage, Some(50.0));
        assert!(step.date.is_some());
    }

    #[test]
    fn test_scheduled_step_wire_format() {
        let raw = r#"{
            "date": "2024-01-01T00:00:00Z",
            "variations": {"variation_A": true},
            "targeting": [{"name": "rule1", "query": "admin eq true", "variation": "variation_A"}],
            "defaultRule": {"variation": "variation_A"},
            "trackEvents": false,
            "disable": true,
            "version": "2"
        }"#;
        let step: ScheduledStep = serde_json::from_str(raw).unwrap();
        assert_eq!(step.get_rules().len(), 1);
        assert_eq!(step.get_rules()[0].name.as_deref(), Some("rule1"));
        assert_eq!(step.disable, Some(true));
        assert_eq!(step.track_events, Some(false));
        assert_eq!(step.version.as_deref(), Some("2"));
    }
}
