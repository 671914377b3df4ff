//! Normalization of an [`EvaluationContext`] into the canonical request body sent to Horizon.
use serde::{Deserialize, Serialize};

use crate::{
    attributes::attributes_to_json, error::ConversionError, Evaluation, EvaluationContext,
};

/// Canonical, fully-resolved form of an [`EvaluationContext`].
///
/// This is the literal body of `POST /toggle/evaluate` and the input of the default cache key.
/// Field order is fixed by the struct and maps are sorted by key, so semantically equal contexts
/// serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePayload {
    /// Empty when neither the context nor its user provide one.
    pub targeting_key: String,
    /// Application of the context, or the configured default.
    pub application: String,
    /// Environment of the context, or the configured default.
    pub environment: String,
    /// Omitted from the JSON when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Custom attributes as JSON, sorted by key.
    #[serde(default)]
    pub custom_attributes: serde_json::Map<String, serde_json::Value>,
    /// Omitted from the JSON when the context has no user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserPayload>,
}

/// Normalized [`UserContext`](crate::UserContext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    /// User id. Serialized as `null` when absent.
    pub id: Option<String>,
    /// User email. Serialized as `null` when absent.
    pub email: Option<String>,
    /// User display name. Serialized as `null` when absent.
    pub name: Option<String>,
    /// User custom attributes as JSON, sorted by key.
    #[serde(default)]
    pub custom_attributes: serde_json::Map<String, serde_json::Value>,
}

impl CachePayload {
    /// Canonical JSON serialization.
    pub fn to_canonical_json(&self) -> Vec<u8> {
        // Keys are strings and numbers are already finite, so serialization cannot fail.
        serde_json::to_vec(self).expect("CachePayload should always serialize to JSON")
    }
}

/// Body of `POST /toggle/telemetry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Normalized context the toggle was resolved for.
    pub context: CachePayload,
    /// The resolved toggle.
    pub data: TelemetryData,
}

/// `data` part of a [`TelemetryPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    /// Evaluation of the resolved toggle, as returned by the service.
    pub toggle: Evaluation,
}

impl TelemetryPayload {
    /// Create a telemetry event reporting `toggle` for `context`.
    pub fn new(context: CachePayload, toggle: Evaluation) -> TelemetryPayload {
        TelemetryPayload {
            context,
            data: TelemetryData { toggle },
        }
    }
}

/// Converts caller contexts into [`CachePayload`]s, filling in configured defaults.
#[derive(Debug, Clone)]
pub struct ContextNormalizer {
    application: String,
    environment: String,
}

impl ContextNormalizer {
    /// Create a normalizer that fills in `application` and `environment` for contexts that don't
    /// set them.
    pub fn new(application: impl Into<String>, environment: impl Into<String>) -> Self {
        ContextNormalizer {
            application: application.into(),
            environment: environment.into(),
        }
    }

    /// Build the canonical payload for `context`.
    ///
    /// The targeting key falls back to `user.id`; if both are missing or empty, the payload
    /// carries an empty targeting key and the caller decides what to do about it. Fails if any
    /// custom attribute has no JSON representation.
    pub fn normalize(&self, context: &EvaluationContext) -> Result<CachePayload, ConversionError> {
        let user_id = context.user.as_ref().and_then(|user| user.id.as_deref());
        let targeting_key = [context.targeting_key.as_deref(), user_id]
            .into_iter()
            .flatten()
            .find(|key| !key.is_empty())
            .unwrap_or_default()
            .to_owned();

        let user = context
            .user
            .as_ref()
            .map(|user| -> Result<UserPayload, ConversionError> {
                Ok(UserPayload {
                    id: user.id.clone(),
                    email: user.email.clone(),
                    name: user.name.clone(),
                    custom_attributes: attributes_to_json(
                        &user.custom_attributes,
                        "user.customAttributes",
                    )?,
                })
            })
            .transpose()?;

        let payload = CachePayload {
            targeting_key,
            application: context
                .application
                .clone()
                .unwrap_or_else(|| self.application.clone()),
            environment: context
                .environment
                .clone()
                .unwrap_or_else(|| self.environment.clone()),
            ip_address: context.ip_address.clone(),
            custom_attributes: attributes_to_json(&context.custom_attributes, "customAttributes")?,
            user,
        };

        log::trace!(target: "hyphen", payload:serde = payload; "normalized evaluation context");

        Ok(payload)
    }
}
