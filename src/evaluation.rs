use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response of `POST /toggle/evaluate`: every toggle evaluated for one context, keyed by toggle
/// key.
///
/// Responses stored in the cache are shared between concurrent callers and are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    /// Evaluated toggles keyed by toggle key.
    pub toggles: HashMap<String, Evaluation>,
    /// Targeting key the toggles were evaluated for. For a context without one, this is the key
    /// made up by the client. Filled in by the client, never read from the service.
    #[serde(skip)]
    pub targeting_key: String,
}

impl EvaluationResponse {
    /// Get the evaluation of `toggle_key`, if the service evaluated it.
    pub fn get(&self, toggle_key: &str) -> Option<&Evaluation> {
        self.toggles.get(toggle_key)
    }
}

/// Evaluation result of a single toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Toggle key.
    pub key: String,
    /// Evaluated value, to be interpreted according to `toggle_type`.
    pub value: serde_json::Value,
    /// Declared type of `value`.
    #[serde(rename = "type")]
    pub toggle_type: ToggleType,
    /// Why the service chose this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error reported by the service for this toggle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Declared type of a toggle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleType {
    /// `true` or `false`.
    Boolean,
    /// A JSON string.
    String,
    /// A JSON number, integral or not.
    Number,
    /// Any JSON value, usually an object.
    Object,
    /// Any type this client doesn't know about. Fails type checks of every typed resolver.
    #[serde(other)]
    Unknown,
}
