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

//! Evaluation must be a pure read: one flag instance is shared across
//! threads, every thread must see identical answers and the flag itself
//! must come out of the stampede unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use flagcore::{EvaluationContext, FlagContext, InternalFlag};
use serde_json::json;

fn time_sensitive_flag() -> InternalFlag {
    // Scheduled steps force the copy-before-mutate path on every evaluation.
    let now = Utc::now();
    serde_json::from_value(json!({
        "variations": {"variation_A": "A", "variation_B": "B"},
        "defaultRule": {
            "percentage": {"variation_A": 50.0, "variation_B": 50.0}
        },
        "scheduledRollout": [
            {
                "date": (now - Duration::hours(1)).to_rfc3339(),
                "defaultRule": {"percentage": {"variation_A": 30.0, "variation_B": 70.0}}
            },
            {
                "date": (now + Duration::hours(1)).to_rfc3339(),
                "disable": true
            }
        ]
    }))
    .expect("flag fixture must deserialize")
}

#[test]
fn concurrent_evaluations_agree_and_leave_the_flag_untouched() {
    let flag = Arc::new(time_sensitive_flag());
    let before = (*flag).clone();
    let flag_ctx = Arc::new(FlagContext {
        default_sdk_value: json!(""),
        ..Default::default()
    });

    let keys: Vec<String> = (0..8).map(|i| format!("user-{i}")).collect();
    let mut expected = HashMap::new();
    for key in &keys {
        let ctx = EvaluationContext::new(key.clone());
        let (value, _) = flag.value("split-flag", &ctx, &flag_ctx);
        expected.insert(key.clone(), value);
    }

    let handles: Vec<_> = (0..16)
        .map(|worker| {
            let flag = Arc::clone(&flag);
            let flag_ctx = Arc::clone(&flag_ctx);
            let keys = keys.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                for round in 0..50 {
                    let key = &keys[(worker + round) % keys.len()];
                    let ctx = EvaluationContext::new(key.clone());
                    let (value, details) = flag.value("split-flag", &ctx, &flag_ctx);
                    assert!(details.error_code.is_none());
                    seen.push((key.clone(), value));
                }
                seen
            })
        })
        .collect();

    for handle in handles {
        for (key, value) in handle.join().expect("worker must not panic") {
            assert_eq!(expected[&key], value, "diverging answer for {key}");
        }
    }

    // The shared flag is byte-for-byte what we started with.
    assert_eq!(*flag, before);
}

#[test]
fn repeated_evaluation_is_idempotent() {
    let flag = time_sensitive_flag();
    let ctx = EvaluationContext::new("user-42");
    let flag_ctx = FlagContext {
        default_sdk_value: json!(""),
        ..Default::default()
    };

    let (first_value, first_details) = flag.value("split-flag", &ctx, &flag_ctx);
    for _ in 0..100 {
        let (value, details) = flag.value("split-flag", &ctx, &flag_ctx);
        assert_eq!(value, first_value);
        assert_eq!(details, first_details);
    }
}
