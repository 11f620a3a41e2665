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

//! A deterministic feature-flag decision engine.
//!
//! # Overview
//!
//! The crate revolves around [`InternalFlag`]: given a flag configuration and a
//! request-scoped [`EvaluationContext`], [`InternalFlag::value`] deterministically
//! computes which variation the subject receives, together with a machine-readable
//! [`ResolutionDetails`] (reason, error code, cacheability).
//!
//! Evaluation is a pure, synchronous computation: the engine never performs I/O,
//! never blocks and never mutates the flag it evaluates. The same flag value can
//! be evaluated concurrently from any number of threads. Identical inputs always
//! yield the identical variation, across processes and across language ports
//! sharing one flag store (see [`bucketing`] for the compatibility-critical hash).
//!
//! # Typed evaluation
//!
//! [`evaluate`] wraps [`InternalFlag::value`] and type-checks the resolved value
//! against the caller's expected Rust type:
//!
//! ```
//! use flagcore::{evaluate, EvaluationContext, FlagContext, InternalFlag, Rule};
//! use std::collections::HashMap;
//!
//! let flag = InternalFlag {
//!     variations: Some(HashMap::from([
//!         ("enabled".to_string(), serde_json::json!(true)),
//!         ("disabled".to_string(), serde_json::json!(false)),
//!     ])),
//!     default_rule: Some(Rule {
//!         variation_result: Some("enabled".to_string()),
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! let ctx = EvaluationContext::new("user-123");
//! let (result, _) = evaluate::<bool>(&flag, "my-flag", &ctx, &FlagContext::default(), false);
//! assert!(result.value);
//! ```
//!
//! # Error handling
//!
//! A flag evaluation call never panics and never leaves the caller without a
//! value: every error path returns the SDK-supplied default together with a
//! diagnostic reason and [`ErrorCode`]. Faults raised by the query evaluators
//! are recovered internally and downgraded to "rule does not match".
//!
//! # Logging
//!
//! The crate uses the [`log`](https://docs.rs/log) macros to report recovered
//! evaluator faults; install any `log`-compatible logger to see them.

pub mod bucketing;
pub mod context;
pub mod errors;
pub mod evaluation;
pub mod flag;
pub mod model;
pub(crate) mod query;
pub(crate) mod utils;

pub use context::{
    ContextSpecifics, EvaluationContext, EvaluationContextBuilder, RESERVED_CONTEXT_KEY,
};
pub use errors::{EvaluationError, Result};
pub use evaluation::{evaluate, FlagValue};
pub use flag::{
    ExperimentationRollout, InternalFlag, ProgressiveRollout, ProgressiveRolloutStep, Rule,
    ScheduledStep, ValidationError,
};
pub use model::{
    ErrorCode, FlagContext, ResolutionDetails, ResolutionReason, VariationResult,
    VARIATION_SDK_DEFAULT,
};
