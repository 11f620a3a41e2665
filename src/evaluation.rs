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

//! Typed evaluation on top of [`InternalFlag::value`]: converts the raw JSON
//! variation value into the type the caller asked for, falling back to the
//! SDK default on a type mismatch.

use serde_json::Value;

use crate::context::EvaluationContext;
use crate::errors::EvaluationError;
use crate::flag::InternalFlag;
use crate::model::{
    ErrorCode, FlagContext, ResolutionReason, VariationResult, VARIATION_SDK_DEFAULT,
};

/// A Rust type a variation value can be converted into.
pub trait FlagValue: Sized {
    /// Converts a variation value, `None` if the JSON type does not fit.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FlagValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FlagValue for i64 {
    // Flag files are often written with float literals ("percentage: 100.0"),
    // so a whole-number float is accepted for integer flags.
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
    }
}

impl FlagValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FlagValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FlagValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Evaluates a flag and converts the result to `T`.
///
/// Resolution errors (disabled flag, configuration faults) are already folded
/// into the [`crate::ResolutionDetails`] by [`InternalFlag::value`]; the only
/// error this layer can add is a type mismatch, returned both inside the
/// result and as a separate [`EvaluationError`] for callers that want to log
/// it.
pub fn evaluate<T: FlagValue + Default>(
    flag: &InternalFlag,
    flag_name: &str,
    ctx: &EvaluationContext,
    flag_ctx: &FlagContext,
    sdk_default: T,
) -> (VariationResult<T>, Option<EvaluationError>) {
    let (value, details) = flag.value(flag_name, ctx, flag_ctx);
    let track_events = flag.is_track_events();
    let version = flag.get_version().map(str::to_string);

    if details.error_code.is_some() {
        return (
            VariationResult {
                value: sdk_default,
                variation_type: details.variant,
                reason: details.reason,
                error_code: details.error_code,
                error_details: details.error_message,
                failed: true,
                track_events,
                version,
                cacheable: details.cacheable,
                metadata: details.metadata,
            },
            None,
        );
    }

    let converted = match &value {
        // A missing variation value falls back to the type default rather
        // than being reported as a mismatch.
        Value::Null => Some(T::default()),
        other => T::from_value(other),
    };

    match converted {
        Some(value) => (
            VariationResult {
                value,
                variation_type: details.variant,
                reason: details.reason,
                error_code: None,
                error_details: None,
                failed: false,
                track_events,
                version,
                cacheable: details.cacheable,
                metadata: details.metadata,
            },
            None,
        ),
        None => {
            let err = EvaluationError::TypeMismatch(flag_name.to_string());
            (
                VariationResult {
                    value: sdk_default,
                    variation_type: VARIATION_SDK_DEFAULT.to_string(),
                    reason: ResolutionReason::Error,
                    error_code: Some(ErrorCode::TypeMismatch),
                    error_details: Some(err.to_string()),
                    failed: true,
                    track_events,
                    version,
                    cacheable: false,
                    metadata: details.metadata,
                },
                Some(err),
            )
        }
    }
}
