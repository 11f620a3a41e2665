use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variant name reported when the SDK default value is served instead of a
/// configured variation (disabled flag, or any error path).
pub const VARIATION_SDK_DEFAULT: &str = "SdkDefault";

/// Why a particular variation was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionReason {
    /// No targeting rules exist and the default rule served a fixed variation.
    Static,
    /// Targeting rules exist but none matched; the default rule served a
    /// fixed variation.
    Default,
    /// A targeting rule matched and served a fixed variation.
    TargetingMatch,
    /// A targeting rule matched and served a percentage/progressive split.
    TargetingMatchSplit,
    /// The default rule served a percentage/progressive split.
    Split,
    /// The flag is disabled or outside its experimentation window.
    Disabled,
    Error,
    Unknown,
}

impl Default for ResolutionReason {
    fn default() -> Self {
        ResolutionReason::Unknown
    }
}

/// Machine-readable error taxonomy exposed to SDK callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    General,
    TargetingKeyMissing,
    TypeMismatch,
    FlagConfig,
    ParseError,
    FlagNotFound,
    ProviderNotReady,
    InvalidContext,
}

/// The outcome of one flag evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolutionDetails {
    /// Name of the variation served (or [`VARIATION_SDK_DEFAULT`]).
    pub variant: String,
    pub reason: ResolutionReason,
    /// Index of the targeting rule that matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// False whenever the outcome depends on the evaluation clock
    /// (scheduled steps, experimentation window, progressive rollout).
    pub cacheable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

/// Flag-level configuration supplied by the embedding SDK for one evaluation.
#[derive(Clone, Debug, Default)]
pub struct FlagContext {
    /// Value returned on every disabled/error path.
    pub default_sdk_value: Value,
    /// Attributes merged into the evaluation context before rule matching.
    /// Entries here override request attributes of the same name.
    pub evaluation_context_enrichment: HashMap<String, Value>,
}

/// Typed evaluation result handed back to SDK callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationResult<T> {
    pub value: T,
    /// Name of the variation served (or [`VARIATION_SDK_DEFAULT`]).
    pub variation_type: String,
    pub reason: ResolutionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    pub failed: bool,
    /// Whether the evaluation should be recorded by the data exporter.
    pub track_events: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub cacheable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}
