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
use serde_json::Value;

/// Reserved attribute name under which callers pass engine-specific fields.
pub const RESERVED_CONTEXT_KEY: &str = "flagcore";

const CURRENT_DATE_TIME_FIELD: &str = "currentDateTime";
const FLAG_LIST_FIELD: &str = "flagList";
const EXPORTER_METADATA_FIELD: &str = "exporterMetadata";

/// Engine-specific fields extracted from the reserved context attribute.
///
/// Extraction is forgiving on purpose: a malformed `currentDateTime` means
/// "no clock override" and non-string `flagList` entries are dropped, never
/// reported as errors. A context without the reserved attribute yields the
/// default (all fields absent).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextSpecifics {
    /// Overrides the evaluation clock, used to test time-based rollouts
    /// without waiting for them.
    pub current_date_time: Option<DateTime<Utc>>,
    /// Restricts a bulk evaluation to the named flags.
    pub flag_list: Option<Vec<String>>,
    /// Opaque metadata forwarded to the data exporter.
    pub exporter_metadata: Option<HashMap<String, Value>>,
}

impl ContextSpecifics {
    pub(crate) fn from_attributes(attributes: &HashMap<String, Value>) -> Self {
        match attributes.get(RESERVED_CONTEXT_KEY) {
            Some(Value::Object(fields)) => Self {
                current_date_time: fields
                    .get(CURRENT_DATE_TIME_FIELD)
                    .and_then(Value::as_str)
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|date| date.with_timezone(&Utc)),
                flag_list: fields.get(FLAG_LIST_FIELD).and_then(Value::as_array).map(
                    |entries| {
                        entries
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    },
                ),
                exporter_metadata: fields
                    .get(EXPORTER_METADATA_FIELD)
                    .and_then(Value::as_object)
                    .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            },
            _ => Self::default(),
        }
    }
}
