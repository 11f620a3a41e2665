use thiserror::Error;

pub use crate::utils::NestedFieldError;

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Internal error taxonomy of the evaluation engine.
///
/// None of these variants ever reaches the caller as a panic: `InternalFlag::value`
/// converts them into a [`crate::ResolutionDetails`] carrying the SDK default
/// plus a user-visible [`crate::ErrorCode`].
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Sentinel used during the rule scan: the targeting rule does not apply
    /// to this evaluation context. Never surfaced to the caller.
    #[error("targeting rule does not apply to this evaluation context")]
    RuleNotApply,

    #[error("impossible to find bucketingKey in context: {0}")]
    BucketingKeyNotFound(#[from] NestedFieldError),

    /// The custom bucketing key resolved to a non-string value.
    #[error("invalid bucketing key")]
    InvalidBucketingKey,

    /// The flag requires bucketing but the resolved key is empty.
    #[error("{0}")]
    EmptyBucketingKey(String),

    /// A percentage or progressive-rollout producer was reached without a
    /// bucketing key. Distinct from [`EvaluationError::EmptyBucketingKey`]:
    /// this one is a flag-configuration fault.
    #[error("rule requires a bucketing key")]
    MissingBucketingKeyForRule,

    #[error("no default targeting for the flag")]
    MissingDefaultRule,

    #[error("error in the configuration, no variation available for this rule")]
    NoResultProducer,

    #[error("error in the progressive rollout, missing params")]
    InvalidProgressiveRollout,

    #[error("impossible to find the variation")]
    BucketNotFound,

    #[error("wrong variation used for flag {0}")]
    TypeMismatch(String),
}
