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

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NestedFieldError {
    #[error("nested key not found: {0}")]
    KeyNotFound(String),
}

/// Resolves a dot-separated path (`"company.id"`) inside an attribute map.
///
/// Intermediate segments must be JSON objects; any missing hop reports the
/// full path, not the segment, so the caller's message stays actionable.
pub(crate) fn get_nested_field_value<'a>(
    attributes: &'a HashMap<String, Value>,
    path: &str,
) -> Result<&'a Value, NestedFieldError> {
    let mut segments = path.split('.');
    let first = segments
        .next()
        .ok_or_else(|| NestedFieldError::KeyNotFound(path.to_string()))?;
    let mut current = attributes
        .get(first)
        .ok_or_else(|| NestedFieldError::KeyNotFound(path.to_string()))?;
    for segment in segments {
        current = current
            .as_object()
            .and_then(|obj| obj.get(segment))
            .ok_or_else(|| NestedFieldError::KeyNotFound(path.to_string()))?;
    }
    Ok(current)
}

/// Strips line breaks and outer whitespace from a query string so that both
/// dialect classifiers see a single-line expression.
pub(crate) fn str_trim(query: &str) -> String {
    query.replace(['\n', '\r'], " ").trim().to_string()
}

/// JSON type label used to check that all variations of a flag share one type.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
