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

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ExperimentationRollout, Rule, ScheduledStep};
use crate::context::EvaluationContext;
use crate::errors::{EvaluationError, Result};
use crate::model::{
    ErrorCode, FlagContext, ResolutionDetails, ResolutionReason, VARIATION_SDK_DEFAULT,
};
use crate::utils::get_nested_field_value;

/// A feature flag as stored in the flag configuration.
///
/// Evaluation is a pure function of the flag, the evaluation context and the
/// clock: [`InternalFlag::value`] never mutates the flag, so one flag instance
/// can serve concurrent evaluations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalFlag {
    /// All values the flag can serve, keyed by variation name. Every
    /// variation of a flag should share one JSON type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variations: Option<HashMap<String, Value>>,

    /// Targeting rules, scanned in order; the first applying rule wins.
    #[serde(rename = "targeting", skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,

    /// Dot-separated path of the context attribute used for bucketing
    /// instead of the targeting key, e.g. `"company.id"` to ramp a rollout
    /// per company rather than per user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucketing_key: Option<String>,

    /// Rule applied when no targeting rule matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<Rule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimentation: Option<ExperimentationRollout>,

    /// Dated flag mutations, folded in declaration order once their date is
    /// reached.
    #[serde(rename = "scheduledRollout", skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<Vec<ScheduledStep>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_events: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Free-form metadata echoed into every resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

/// Outcome of the rule scan, before the variation name is turned into a value.
struct VariationSelection {
    name: String,
    reason: ResolutionReason,
    rule_index: Option<usize>,
    rule_name: Option<String>,
    cacheable: bool,
}

impl InternalFlag {
    /// Evaluates the flag for a context and returns the variation value plus
    /// the resolution details.
    ///
    /// Every error path returns the SDK default value from `flag_ctx` with
    /// reason [`ResolutionReason::Error`]; this method never fails.
    pub fn value(
        &self,
        flag_name: &str,
        ctx: &EvaluationContext,
        flag_ctx: &FlagContext,
    ) -> (Value, ResolutionDetails) {
        let specifics = ctx.extract_protected_fields();
        let now = specifics.current_date_time.unwrap_or_else(Utc::now);
        let flag = self.apply_scheduled_rollout_steps(now);

        let mut context_map = ctx.to_map();
        for (name, value) in &flag_ctx.evaluation_context_enrichment {
            context_map.insert(name.clone(), value.clone());
        }

        let key = match flag.resolve_bucketing_key(ctx.get_key(), &context_map) {
            Ok(key) => key,
            Err(err) => {
                return (
                    flag_ctx.default_sdk_value.clone(),
                    ResolutionDetails {
                        variant: VARIATION_SDK_DEFAULT.to_string(),
                        reason: ResolutionReason::Error,
                        error_code: Some(ErrorCode::TargetingKeyMissing),
                        error_message: Some(err.to_string()),
                        metadata: flag.metadata.clone(),
                        ..Default::default()
                    },
                );
            }
        };

        if flag.is_disable() || flag.is_experimentation_over(now) {
            return (
                flag_ctx.default_sdk_value.clone(),
                ResolutionDetails {
                    variant: VARIATION_SDK_DEFAULT.to_string(),
                    reason: ResolutionReason::Disabled,
                    // Cacheability is judged on the stored flag, not the
                    // compiled copy: a flag disabled by a scheduled step may
                    // re-enable at the next step.
                    cacheable: self.is_cacheable(),
                    metadata: flag.metadata.clone(),
                    ..Default::default()
                },
            );
        }

        match flag.select_variation(flag_name, &key, &context_map, now) {
            Ok(selection) => {
                let value = flag.get_variation_value(&selection.name);
                let metadata = flag.construct_metadata(&selection);
                (
                    value,
                    ResolutionDetails {
                        variant: selection.name,
                        reason: selection.reason,
                        rule_index: selection.rule_index,
                        rule_name: selection.rule_name,
                        cacheable: selection.cacheable,
                        metadata,
                        ..Default::default()
                    },
                )
            }
            Err(err) => (
                flag_ctx.default_sdk_value.clone(),
                ResolutionDetails {
                    variant: VARIATION_SDK_DEFAULT.to_string(),
                    reason: ResolutionReason::Error,
                    error_code: Some(ErrorCode::FlagConfig),
                    error_message: Some(err.to_string()),
                    metadata: flag.metadata.clone(),
                    ..Default::default()
                },
            ),
        }
    }

    /// Folds every scheduled step whose date is reached into a compiled copy
    /// of the flag. Steps apply in declaration order, whatever their dates,
    /// and compound: each step merges into the result of the previous ones.
    ///
    /// Returns the flag unchanged (borrowed) when no step applies.
    pub fn apply_scheduled_rollout_steps(&self, now: DateTime<Utc>) -> Cow<'_, InternalFlag> {
        let steps = match &self.scheduled {
            Some(steps) if steps.iter().any(|step| step_applies(step, now)) => steps,
            _ => return Cow::Borrowed(self),
        };

        let mut flag = self.clone();
        for step in steps {
            if !step_applies(step, now) {
                continue;
            }
            if let Some(step_variations) = &step.variations {
                flag.variations
                    .get_or_insert_with(HashMap::new)
                    .extend(step_variations.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if step.rules.is_some() {
                let merged = Rule::merge_rule_sets(flag.get_rules(), step.get_rules());
                flag.rules = Some(merged);
            }
            if let Some(step_default) = &step.default_rule {
                match &mut flag.default_rule {
                    Some(default_rule) => default_rule.merge(step_default),
                    None => flag.default_rule = Some(step_default.clone()),
                }
            }
            if let Some(step_experimentation) = &step.experimentation {
                let experimentation = flag.experimentation.get_or_insert_with(Default::default);
                if step_experimentation.start.is_some() {
                    experimentation.start = step_experimentation.start;
                }
                if step_experimentation.end.is_some() {
                    experimentation.end = step_experimentation.end;
                }
            }
            if step.track_events.is_some() {
                flag.track_events = step.track_events;
            }
            if step.disable.is_some() {
                flag.disable = step.disable;
            }
            if step.version.is_some() {
                flag.version = step.version.clone();
            }
        }
        Cow::Owned(flag)
    }

    /// Scans the targeting rules in order and falls back to the default rule.
    fn select_variation(
        &self,
        flag_name: &str,
        key: &str,
        context: &HashMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<VariationSelection> {
        let flag_cacheable = self.is_cacheable();

        for (index, rule) in self.get_rules().iter().enumerate() {
            if rule.is_disable() {
                continue;
            }
            match rule.evaluate(key, context, flag_name, false, now) {
                Ok(name) => {
                    return Ok(VariationSelection {
                        name,
                        reason: select_evaluation_reason(true, true, rule.is_dynamic(), false),
                        rule_index: Some(index),
                        rule_name: rule.name.clone(),
                        cacheable: flag_cacheable && rule.progressive_rollout.is_none(),
                    });
                }
                Err(EvaluationError::RuleNotApply) => continue,
                Err(err) => return Err(err),
            }
        }

        let default_rule = self
            .default_rule
            .as_ref()
            .ok_or(EvaluationError::MissingDefaultRule)?;
        let name = default_rule.evaluate(key, context, flag_name, true, now)?;
        let has_rule = !self.get_rules().is_empty();
        Ok(VariationSelection {
            name,
            reason: select_evaluation_reason(has_rule, false, default_rule.is_dynamic(), true),
            rule_index: None,
            rule_name: None,
            cacheable: flag_cacheable && default_rule.progressive_rollout.is_none(),
        })
    }

    /// Resolves the key used for consistent bucketing: the attribute at
    /// `bucketing_key` when configured, the targeting key otherwise.
    fn resolve_bucketing_key(
        &self,
        targeting_key: &str,
        context: &HashMap<String, Value>,
    ) -> Result<String> {
        let key = match self.bucketing_key.as_deref().filter(|path| !path.is_empty()) {
            Some(path) => match get_nested_field_value(context, path)? {
                Value::String(key) => key.clone(),
                _ => return Err(EvaluationError::InvalidBucketingKey),
            },
            None => targeting_key.to_string(),
        };

        // An empty key is tolerated as long as nothing in the flag buckets
        // on it; a percentage or progressive rollout makes it an error.
        if key.is_empty() && self.requires_bucketing() {
            let message = if self.bucketing_key.is_some() {
                "Empty bucketing key"
            } else {
                "Empty targeting key"
            };
            return Err(EvaluationError::EmptyBucketingKey(message.to_string()));
        }
        Ok(key)
    }

    /// True if any rule of the flag, including rules brought in by scheduled
    /// steps, buckets on the key.
    pub fn requires_bucketing(&self) -> bool {
        let rule_needs_key = |rule: &Rule| rule.requires_bucketing();
        self.get_rules().iter().any(rule_needs_key)
            || self.default_rule.as_ref().is_some_and(rule_needs_key)
            || self
                .scheduled
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|step| {
                    step.get_rules().iter().any(rule_needs_key)
                        || step.default_rule.as_ref().is_some_and(rule_needs_key)
                })
    }

    /// True if evaluating this flag twice with the same context always gives
    /// the same answer: no scheduled steps and no experimentation window.
    /// Progressive rollouts are accounted for per-rule during selection.
    pub fn is_cacheable(&self) -> bool {
        let has_scheduled = self.scheduled.as_ref().is_some_and(|steps| !steps.is_empty());
        !has_scheduled && self.experimentation.is_none()
    }

    fn is_experimentation_over(&self, now: DateTime<Utc>) -> bool {
        self.experimentation.as_ref().is_some_and(|experimentation| {
            experimentation.start.is_some_and(|start| now < start)
                || experimentation.end.is_some_and(|end| now > end)
        })
    }

    fn construct_metadata(&self, selection: &VariationSelection) -> Option<HashMap<String, Value>> {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        if let Some(rule_name) = selection.rule_name.as_deref().filter(|name| !name.is_empty()) {
            metadata.insert(
                "evaluatedRuleName".to_string(),
                Value::String(rule_name.to_string()),
            );
        }
        if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        }
    }

    pub fn is_disable(&self) -> bool {
        self.disable.unwrap_or(false)
    }

    /// Whether evaluations of this flag should be recorded by the data
    /// exporter. Defaults to true.
    pub fn is_track_events(&self) -> bool {
        self.track_events.unwrap_or(true)
    }

    pub fn get_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn get_metadata(&self) -> Option<&HashMap<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn get_rules(&self) -> &[Rule] {
        self.rules.as_deref().unwrap_or_default()
    }

    pub fn get_default_rule(&self) -> Option<&Rule> {
        self.default_rule.as_ref()
    }

    pub fn get_bucketing_key(&self) -> Option<&str> {
        self.bucketing_key.as_deref()
    }

    pub fn get_variations(&self) -> Option<&HashMap<String, Value>> {
        self.variations.as_ref()
    }

    /// The value of a variation by name, `Null` if the variation does not
    /// exist.
    pub fn get_variation_value(&self, name: &str) -> Value {
        self.variations
            .as_ref()
            .and_then(|variations| variations.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Index of the named targeting rule, used by scheduled-rollout tooling.
    pub fn get_rule_index_by_name(&self, name: &str) -> Option<usize> {
        self.get_rules().iter().position(|rule| rule.get_name() == name)
    }
}

fn step_applies(step: &ScheduledStep, now: DateTime<Utc>) -> bool {
    step.date.is_some_and(|date| date <= now)
}

/// Maps the shape of the winning rule to the reported resolution reason.
fn select_evaluation_reason(
    has_rule: bool,
    targeting_match: bool,
    is_dynamic: bool,
    is_default_rule: bool,
) -> ResolutionReason {
    if has_rule && targeting_match {
        return if is_dynamic {
            ResolutionReason::TargetingMatchSplit
        } else {
            ResolutionReason::TargetingMatch
        };
    }
    if is_default_rule {
        if is_dynamic {
            return ResolutionReason::Split;
        }
        return if has_rule {
            ResolutionReason::Default
        } else {
            ResolutionReason::Static
        };
    }
    ResolutionReason::Unknown
}
