use std::sync::Arc;

use chrono::Utc;
use rand::{thread_rng, Rng};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    cache::ResponseCache,
    dispatcher::EndpointDispatcher,
    endpoints::build_endpoint_list,
    transport::{HttpTransport, Transport},
    CachePayload, ClientConfig, ContextNormalizer, Error, Evaluation, EvaluationContext,
    EvaluationResponse, Result, TelemetryPayload,
};

const EVALUATE_PATH: &str = "/toggle/evaluate";
const TELEMETRY_PATH: &str = "/toggle/telemetry";

/// A client for the Hyphen Toggle evaluation service.
///
/// Evaluations are cached per context for the configured TTL. Requests go to the configured
/// Horizon URLs in order, falling back to the next one on failure.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use hyphen_toggle::{ClientConfig, ToggleClient};
/// let client = ToggleClient::new(ClientConfig::new("public_key", "my-app", "production"));
/// ```
pub struct ToggleClient {
    normalizer: ContextNormalizer,
    cache: ResponseCache,
    dispatcher: EndpointDispatcher,
}

impl ToggleClient {
    /// Create a new `ToggleClient` using the specified configuration.
    pub fn new(config: ClientConfig) -> Result<ToggleClient> {
        config.validate()?;
        let transport = HttpTransport::new(&config.public_key, config.request_timeout)?;
        ToggleClient::build(config, Arc::new(transport))
    }

    /// Create a new `ToggleClient` that sends requests through a custom [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<ToggleClient> {
        config.validate()?;
        ToggleClient::build(config, transport)
    }

    /// Assemble a client from an already validated `config`.
    fn build(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<ToggleClient> {
        let endpoints = build_endpoint_list(&config.public_key, &config.horizon_urls)?;
        let normalizer = ContextNormalizer::new(config.application, config.environment);
        let cache = ResponseCache::new(&config.cache, normalizer.clone());

        Ok(ToggleClient {
            normalizer,
            cache,
            dispatcher: EndpointDispatcher::new(endpoints, transport),
        })
    }

    /// Horizon endpoints in the order they are tried.
    pub fn endpoints(&self) -> &[Url] {
        self.dispatcher.endpoints()
    }

    /// The response cache backing [`ToggleClient::evaluate`].
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Normalize `context` into the payload sent to the service.
    pub fn build_payload(&self, context: &EvaluationContext) -> Result<CachePayload> {
        Ok(self.normalizer.normalize(context)?)
    }

    /// Evaluate all toggles for `context`.
    ///
    /// Serves the response from cache when possible. Otherwise fetches it from the first Horizon
    /// endpoint that answers and caches it under `context`.
    pub async fn evaluate(&self, context: &EvaluationContext) -> Result<Arc<EvaluationResponse>> {
        self.evaluate_inner(context, None).await
    }

    /// Same as [`ToggleClient::evaluate`], but gives up with [`Error::Cancelled`] as soon as
    /// `cancel` fires. Nothing is cached for a cancelled evaluation.
    pub async fn evaluate_with_cancellation(
        &self,
        context: &EvaluationContext,
        cancel: &CancellationToken,
    ) -> Result<Arc<EvaluationResponse>> {
        self.evaluate_inner(context, Some(cancel)).await
    }

    /// Evaluate a single toggle. Returns [`Error::FlagNotFound`] if the service didn't evaluate
    /// `toggle_key` for this context.
    pub async fn get_evaluation(
        &self,
        toggle_key: &str,
        context: &EvaluationContext,
    ) -> Result<Evaluation> {
        let response = self.evaluate(context).await?;
        response
            .get(toggle_key)
            .cloned()
            .ok_or_else(|| Error::FlagNotFound(toggle_key.to_owned()))
    }

    /// Report a toggle evaluation to the telemetry endpoint.
    ///
    /// The response body is ignored. Failures are returned to the caller.
    pub async fn post_telemetry(&self, payload: &TelemetryPayload) -> Result<()> {
        self.dispatcher.dispatch(TELEMETRY_PATH, payload, None).await?;
        log::debug!(target: "hyphen", toggle_key = payload.data.toggle.key.as_str(); "posted toggle telemetry");
        Ok(())
    }

    /// Report the `evaluation` of a toggle taken from `response` for `context` to the telemetry
    /// endpoint.
    ///
    /// A context without a targeting key is reported under the key `response` was evaluated for,
    /// so usage events match the evaluation request.
    pub async fn post_evaluation_telemetry(
        &self,
        context: &EvaluationContext,
        response: &EvaluationResponse,
        evaluation: Evaluation,
    ) -> Result<()> {
        let mut payload = self.build_payload(context)?;
        if payload.targeting_key.is_empty() {
            payload.targeting_key = response.targeting_key.clone();
        }
        self.post_telemetry(&TelemetryPayload::new(payload, evaluation)).await
    }

    async fn evaluate_inner(
        &self,
        context: &EvaluationContext,
        cancel: Option<&CancellationToken>,
    ) -> Result<Arc<EvaluationResponse>> {
        let mut payload = self.normalizer.normalize(context)?;
        // Keyed by the caller's context, before any targeting key is made up.
        let cache_key = self.cache.key_for(context, &payload);

        if let Some(cached) = self.cache.get_at(&cache_key, Utc::now()) {
            log::debug!(target: "hyphen", targeting_key = payload.targeting_key.as_str(); "evaluation cache hit");
            return Ok(cached);
        }
        log::debug!(target: "hyphen", targeting_key = payload.targeting_key.as_str(); "evaluation cache miss");

        if payload.targeting_key.is_empty() {
            payload.targeting_key = synthetic_targeting_key(&payload);
        }

        let body = self
            .dispatcher
            .dispatch(EVALUATE_PATH, &payload, cancel)
            .await?;

        let mut response: EvaluationResponse = serde_json::from_str(&body).map_err(|err| {
            log::warn!(target: "hyphen", "failed to parse evaluation response body: {:?}", err);
            Error::ResponseParse(Arc::new(err))
        })?;
        response.targeting_key = payload.targeting_key;
        let response = Arc::new(response);

        log::debug!(target: "hyphen",
                    targeting_key = response.targeting_key.as_str(),
                    toggles = response.toggles.len();
                    "successfully fetched evaluation");

        self.cache.insert_at(cache_key, response.clone(), Utc::now());

        Ok(response)
    }
}

/// Make up a targeting key for a context that has none: `{application}-{environment}-{8 hex}`.
fn synthetic_targeting_key(payload: &CachePayload) -> String {
    format!(
        "{}-{}-{:08x}",
        payload.application,
        payload.environment,
        thread_rng().gen::<u32>()
    )
}
