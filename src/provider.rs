//! Typed toggle resolution for feature flag frameworks.
//!
//! [`ToggleProvider`] never fails: every error is reported in [`ResolutionDetails::error`] next to
//! the caller's default value.
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    ClientConfig, Error, Evaluation, EvaluationContext, EvaluationResponse, Result, ToggleClient,
    ToggleType,
};

/// Name reported by [`ToggleProvider::name`].
pub const PROVIDER_NAME: &str = "hyphen-toggle-rust";

/// Outcome of resolving one toggle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetails<T> {
    /// Key of the resolved toggle.
    pub flag_key: String,
    /// Resolved value, or the caller's default if `error` is set.
    pub value: T,
    /// Reason reported by the service, or `"ERROR"` on fallback.
    pub reason: Option<String>,
    /// Set when `value` is the caller's default.
    pub error: Option<ResolutionError>,
}

/// Why a resolution fell back to the default value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code:?}: {message}")]
pub struct ResolutionError {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable description of the failure.
    pub message: String,
}

/// Category of a [`ResolutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The service did not evaluate the requested toggle.
    FlagNotFound,
    /// The toggle has a different type than requested.
    TypeMismatch,
    /// The toggle value could not be converted to the requested type.
    ParseError,
    /// Any other failure: transport, configuration, context conversion.
    General,
}

impl<T> ResolutionDetails<T> {
    fn fallback(flag_key: &str, default: T, code: ErrorCode, message: impl Into<String>) -> Self {
        ResolutionDetails {
            flag_key: flag_key.to_owned(),
            value: default,
            reason: Some("ERROR".to_owned()),
            error: Some(ResolutionError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// A value type a toggle can resolve to.
pub trait ToggleValue: Sized {
    /// Toggle type the service must report for this value type.
    const TOGGLE_TYPE: ToggleType;

    /// Convert the service value. Returns `None` if it doesn't fit.
    fn from_toggle_value(value: &serde_json::Value) -> Option<Self>;
}

impl ToggleValue for bool {
    const TOGGLE_TYPE: ToggleType = ToggleType::Boolean;

    fn from_toggle_value(value: &serde_json::Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ToggleValue for String {
    const TOGGLE_TYPE: ToggleType = ToggleType::String;

    fn from_toggle_value(value: &serde_json::Value) -> Option<Self> {
        value.as_str().map(ToOwned::to_owned)
    }
}

impl ToggleValue for i64 {
    const TOGGLE_TYPE: ToggleType = ToggleType::Number;

    fn from_toggle_value(value: &serde_json::Value) -> Option<Self> {
        value.as_i64().or_else(|| {
            value
                .as_f64()
                // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        })
    }
}

impl ToggleValue for f64 {
    const TOGGLE_TYPE: ToggleType = ToggleType::Number;

    fn from_toggle_value(value: &serde_json::Value) -> Option<Self> {
        value.as_f64()
    }
}

/// Resolves typed toggle values through a [`ToggleClient`] and reports usage telemetry.
pub struct ToggleProvider {
    client: ToggleClient,
    enable_toggle_usage: bool,
}

impl ToggleProvider {
    /// Create a provider with its own [`ToggleClient`].
    pub fn new(config: ClientConfig) -> Result<ToggleProvider> {
        let enable_toggle_usage = config.enable_toggle_usage;
        Ok(ToggleProvider::with_client(
            ToggleClient::new(config)?,
            enable_toggle_usage,
        ))
    }

    /// Create a provider on top of an existing client. `enable_toggle_usage` controls telemetry
    /// reporting.
    pub fn with_client(client: ToggleClient, enable_toggle_usage: bool) -> ToggleProvider {
        ToggleProvider {
            client,
            enable_toggle_usage,
        }
    }

    /// Provider name, [`PROVIDER_NAME`].
    pub fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    /// The underlying client.
    pub fn client(&self) -> &ToggleClient {
        &self.client
    }

    /// Resolve a `boolean` toggle.
    pub async fn resolve_boolean_value(
        &self,
        flag_key: &str,
        default: bool,
        context: &EvaluationContext,
    ) -> ResolutionDetails<bool> {
        self.resolve_value(flag_key, default, context).await
    }

    /// Resolve a `string` toggle.
    pub async fn resolve_string_value(
        &self,
        flag_key: &str,
        default: String,
        context: &EvaluationContext,
    ) -> ResolutionDetails<String> {
        self.resolve_value(flag_key, default, context).await
    }

    /// Resolve a `number` toggle as an integer. Non-integral values are a parse error.
    pub async fn resolve_number_value(
        &self,
        flag_key: &str,
        default: i64,
        context: &EvaluationContext,
    ) -> ResolutionDetails<i64> {
        self.resolve_value(flag_key, default, context).await
    }

    /// Resolve a `number` toggle as a float.
    pub async fn resolve_float_value(
        &self,
        flag_key: &str,
        default: f64,
        context: &EvaluationContext,
    ) -> ResolutionDetails<f64> {
        self.resolve_value(flag_key, default, context).await
    }

    /// Resolve an `object` toggle and deserialize it into `T`.
    pub async fn resolve_object_value<T: DeserializeOwned>(
        &self,
        flag_key: &str,
        default: T,
        context: &EvaluationContext,
    ) -> ResolutionDetails<T> {
        self.resolve_with(flag_key, default, context, ToggleType::Object, |value| {
            if value.is_null() {
                return Err("object toggle has a null value".to_owned());
            }
            serde_json::from_value(value.clone()).map_err(|err| err.to_string())
        })
        .await
    }

    /// Resolve a toggle of any [`ToggleValue`] type.
    pub async fn resolve_value<T: ToggleValue>(
        &self,
        flag_key: &str,
        default: T,
        context: &EvaluationContext,
    ) -> ResolutionDetails<T> {
        self.resolve_with(flag_key, default, context, T::TOGGLE_TYPE, |value| {
            T::from_toggle_value(value)
                .ok_or_else(|| format!("cannot convert {value} to {:?}", T::TOGGLE_TYPE))
        })
        .await
    }

    async fn resolve_with<T>(
        &self,
        flag_key: &str,
        default: T,
        context: &EvaluationContext,
        expected: ToggleType,
        convert: impl FnOnce(&serde_json::Value) -> std::result::Result<T, String>,
    ) -> ResolutionDetails<T> {
        let evaluated = self.client.evaluate(context).await.and_then(|response| {
            let evaluation = response.get(flag_key).cloned();
            match evaluation {
                Some(evaluation) => Ok((response, evaluation)),
                None => Err(Error::FlagNotFound(flag_key.to_owned())),
            }
        });
        let (response, evaluation) = match evaluated {
            Ok(evaluated) => evaluated,
            Err(err) => {
                log::warn!(target: "hyphen", flag_key; "error occurred while resolving a toggle: {:?}", err);
                let code = match err {
                    Error::FlagNotFound(_) => ErrorCode::FlagNotFound,
                    _ => ErrorCode::General,
                };
                return ResolutionDetails::fallback(flag_key, default, code, err.to_string());
            }
        };

        if evaluation.toggle_type != expected {
            return ResolutionDetails::fallback(
                flag_key,
                default,
                ErrorCode::TypeMismatch,
                format!(
                    "expected {:?} toggle, found {:?}",
                    expected, evaluation.toggle_type
                ),
            );
        }

        let value = match convert(&evaluation.value) {
            Ok(value) => value,
            Err(message) => {
                return ResolutionDetails::fallback(flag_key, default, ErrorCode::ParseError, message)
            }
        };

        let reason = evaluation.reason.clone();
        self.after_evaluation(context, &response, evaluation).await;

        ResolutionDetails {
            flag_key: flag_key.to_owned(),
            value,
            reason,
            error: None,
        }
    }

    /// Report a successful resolution. Telemetry failures are logged and otherwise ignored.
    async fn after_evaluation(
        &self,
        context: &EvaluationContext,
        response: &EvaluationResponse,
        evaluation: Evaluation,
    ) {
        if !self.enable_toggle_usage {
            return;
        }

        if let Err(err) = self
            .client
            .post_evaluation_telemetry(context, response, evaluation)
            .await
        {
            log::warn!(target: "hyphen", "failed to post toggle telemetry: {:?}", err);
        }
    }
}
