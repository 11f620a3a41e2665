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

//! The flag data model: variations, targeting rules, rollout strategies and
//! the evaluation entry point [`InternalFlag::value`].

mod internal_flag;
mod rollout;
mod rule;
mod validation;

pub use internal_flag::InternalFlag;
pub use rollout::{
    ExperimentationRollout, ProgressiveRollout, ProgressiveRolloutStep, ScheduledStep,
};
pub use rule::Rule;
pub use validation::ValidationError;

/// Percentages are handled with three decimal places of precision: a
/// percentage of 0.001% is representable, so hashes are bucketed modulo
/// `sum(percentages) * 1000`.
pub const PERCENTAGE_MULTIPLIER: f64 = 1000.0;
