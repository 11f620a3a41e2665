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

//! The evaluation context: who the flag is being evaluated for.

mod protected;

pub use protected::{ContextSpecifics, RESERVED_CONTEXT_KEY};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute bag identifying the subject of an evaluation.
///
/// Most of the time it identifies a user browsing your site. The only
/// mandatory property is the targeting key, which must be a unique
/// identifier: a username or e-mail address for authenticated users, an IP
/// address or session ID for anonymous ones.
///
/// A context is conceptually read-only after construction. Attribute
/// enrichment through [`EvaluationContext::add_custom_attribute`] exists for
/// merge operations performed before an evaluation and takes `&mut self`:
/// a context is single-writer, many-reader and must not be shared across
/// threads while being enriched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(rename = "targetingKey")]
    targeting_key: String,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

impl EvaluationContext {
    /// Creates a new evaluation context identified by the given targeting key.
    pub fn new(targeting_key: impl Into<String>) -> Self {
        Self {
            targeting_key: targeting_key.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn builder(targeting_key: impl Into<String>) -> EvaluationContextBuilder {
        EvaluationContextBuilder {
            context: Self::new(targeting_key),
        }
    }

    /// The unique targeting key for the subject.
    pub fn get_key(&self) -> &str {
        &self.targeting_key
    }

    /// All custom attributes added to the context.
    pub fn get_custom(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Adds a custom attribute. An empty name is a no-op.
    pub fn add_custom_attribute(&mut self, name: &str, value: Value) {
        if !name.is_empty() {
            self.attributes.insert(name.to_string(), value);
        }
    }

    /// The context as a flat map, the shape both query dialects evaluate
    /// against: all custom attributes plus `targetingKey`.
    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut map = self.attributes.clone();
        map.insert(
            "targetingKey".to_string(),
            Value::String(self.targeting_key.clone()),
        );
        map
    }

    /// Extracts the engine-reserved fields from the context attributes.
    ///
    /// Side-effect free and callable any number of times.
    pub fn extract_protected_fields(&self) -> ContextSpecifics {
        ContextSpecifics::from_attributes(&self.attributes)
    }
}

/// Builder for [`EvaluationContext`].
#[derive(Clone, Debug)]
pub struct EvaluationContextBuilder {
    context: EvaluationContext,
}

impl EvaluationContextBuilder {
    /// Adds a custom attribute. An empty name is a no-op.
    pub fn add_custom(mut self, name: &str, value: Value) -> Self {
        self.context.add_custom_attribute(name, value);
        self
    }

    pub fn build(self) -> EvaluationContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_custom_attribute_empty_name_is_noop() {
        let mut ctx = EvaluationContext::new("user-key");
        ctx.add_custom_attribute("", json!("ignored"));
        assert!(ctx.get_custom().is_empty());

        ctx.add_custom_attribute("plan", json!("pro"));
        assert_eq!(ctx.get_custom().get("plan"), Some(&json!("pro")));
    }

    #[test]
    fn test_to_map_contains_targeting_key() {
        let ctx = EvaluationContext::builder("user-key")
            .add_custom("email", json!("foo@example.com"))
            .build();
        let map = ctx.to_map();
        assert_eq!(map.get("targetingKey"), Some(&json!("user-key")));
        assert_eq!(map.get("email"), Some(&json!("foo@example.com")));
    }

    #[test]
    fn test_serialization_shape() {
        let ctx = EvaluationContext::builder("user-key")
            .add_custom("admin", json!(true))
            .build();
        let serialized = serde_json::to_value(&ctx).unwrap();
        assert_eq!(
            serialized,
            json!({"targetingKey": "user-key", "attributes": {"admin": true}})
        );
    }

    #[test]
    fn test_builder_keeps_last_value_for_duplicate_name() {
        let ctx = EvaluationContext::builder("user-key")
            .add_custom("plan", json!("free"))
            .add_custom("plan", json!("pro"))
            .build();
        assert_eq!(ctx.get_custom().get("plan"), Some(&json!("pro")));
    }
}
