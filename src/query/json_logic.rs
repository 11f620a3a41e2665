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

//! JSON-Logic query dialect, backed by the `jsonlogic` crate.
//!
//! Only a literal boolean `true` result is a match: a query resolving to a
//! string, a number or anything else does not match, it is not coerced.

use std::collections::HashMap;

use serde_json::Value;

pub(crate) fn evaluate(query: &str, context: &HashMap<String, Value>) -> bool {
    let rule: Value = match serde_json::from_str(query) {
        Ok(rule) => rule,
        Err(err) => {
            log::warn!("ignoring malformed jsonlogic query '{query}': {err}");
            return false;
        }
    };
    let data = Value::Object(
        context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    match jsonlogic::apply(&rule, &data) {
        Ok(Value::Bool(true)) => true,
        Ok(_) => false,
        Err(err) => {
            log::warn!("error while evaluating jsonlogic query '{query}': {err}");
            false
        }
    }
}

pub(crate) fn validate(query: &str) -> Result<(), String> {
    let rule: Value = serde_json::from_str(query).map_err(|e| e.to_string())?;
    // The crate has no standalone validator, so probe the rule against an
    // empty data object: unknown operators and malformed arguments error out.
    jsonlogic::apply(&rule, &Value::Object(serde_json::Map::new())).map(|_| ())
}
