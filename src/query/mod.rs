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

//! Rule query dialects.
//!
//! A rule query is written either in the simple comparison DSL or as a
//! JSON-Logic object. The dialect is auto-selected: if the trimmed query
//! parses as a JSON object it is JSON-Logic, otherwise it is the DSL.
//! Whatever the dialect, a faulty query can only make the rule not match;
//! it never aborts the evaluation.

pub(crate) mod dsl;
pub(crate) mod json_logic;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QueryFormat {
    SimpleDsl,
    JsonLogic,
}

pub(crate) fn classify(query: &str) -> QueryFormat {
    if looks_like_json_object(query) {
        QueryFormat::JsonLogic
    } else {
        QueryFormat::SimpleDsl
    }
}

fn looks_like_json_object(query: &str) -> bool {
    serde_json::from_str::<Value>(query)
        .map(|value| value.is_object())
        .unwrap_or(false)
}

/// Evaluates a (trimmed) query against the context map.
///
/// An empty query always matches: it is the default rule's query. Any fault
/// raised by an evaluator, including panics on malformed logic, is recovered
/// and treated as "no match".
pub(crate) fn evaluate(query: &str, context: &HashMap<String, Value>) -> bool {
    if query.is_empty() {
        return true;
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match classify(query) {
        QueryFormat::JsonLogic => json_logic::evaluate(query, context),
        QueryFormat::SimpleDsl => dsl::evaluate(query, context),
    }));
    match outcome {
        Ok(matched) => matched,
        Err(_) => {
            log::error!("panic recovered while evaluating query '{query}'");
            false
        }
    }
}

/// Checks a query ahead of time, for the flag linter. Evaluation itself never
/// calls this: a bad query simply does not match.
pub(crate) fn validate(query: &str) -> Result<(), String> {
    match classify(query) {
        QueryFormat::JsonLogic => json_logic::validate(query),
        QueryFormat::SimpleDsl => dsl::parse(query).map(|_| ()).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(r#"{"==": [{"var": "plan"}, "pro"]}"#, QueryFormat::JsonLogic)]
    #[case(r#"plan eq "pro""#, QueryFormat::SimpleDsl)]
    #[case("[1, 2]", QueryFormat::SimpleDsl)]
    #[case("42", QueryFormat::SimpleDsl)]
    #[case("", QueryFormat::SimpleDsl)]
    fn test_classify(#[case] query: &str, #[case] expected: QueryFormat) {
        assert_eq!(classify(query), expected);
    }

    #[test]
    fn test_empty_query_always_matches() {
        assert!(evaluate("", &HashMap::new()));
    }

    #[test]
    fn test_both_dialects_against_same_context() {
        let ctx = HashMap::from([("plan".to_string(), json!("pro"))]);
        assert!(evaluate(r#"plan eq "pro""#, &ctx));
        assert!(evaluate(r#"{"==": [{"var": "plan"}, "pro"]}"#, &ctx));
    }

    #[test]
    fn test_malformed_query_is_no_match() {
        let ctx = HashMap::from([("plan".to_string(), json!("pro"))]);
        assert!(!evaluate("plan eq", &ctx));
        assert!(!evaluate(r#"{"substr": [{"var": "plan"}, 1, 99]}"#, &ctx));
    }
}
