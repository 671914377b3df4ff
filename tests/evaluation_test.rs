use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hyphen_toggle::{
    cache::default_cache_key, transport::Transport, AttributeValue, Attributes, CacheConfig,
    ClientConfig, EndpointFailure, Error, EvaluationContext, ToggleClient, UserContext,
};
use serde_json::json;
use url::Url;

// base64("acme:secret")
const PUBLIC_KEY: &str = "public_YWNtZTpzZWNyZXQ=";
const DEFAULT_HOST: &str = "acme.toggle.hyphen.cloud";
const F1_RESPONSE: &str = r#"{"toggles":{"f1":{"key":"f1","value":true,"type":"boolean"}}}"#;

/// Answers by host; hosts without an answer refuse with 503.
#[derive(Default)]
struct ScriptedTransport {
    answers: HashMap<String, String>,
    attempts: Mutex<Vec<Url>>,
}

impl ScriptedTransport {
    fn answer(mut self, host: &str, body: &str) -> Self {
        self.answers.insert(host.to_owned(), body.to_owned());
        self
    }

    fn attempted_hosts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|url| url.host_str().unwrap().to_owned())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, url: Url, _body: Vec<u8>) -> Result<String, EndpointFailure> {
        self.attempts.lock().unwrap().push(url.clone());
        match self.answers.get(url.host_str().unwrap_or_default()) {
            Some(body) => Ok(body.clone()),
            None => Err(EndpointFailure::Status {
                url,
                status: 503,
                body: "service unavailable".to_owned(),
            }),
        }
    }
}

fn client(config: ClientConfig, transport: &Arc<ScriptedTransport>) -> ToggleClient {
    ToggleClient::with_transport(config, transport.clone()).unwrap()
}

fn config() -> ClientConfig {
    ClientConfig::new(PUBLIC_KEY, "checkout", "production")
}

#[tokio::test]
async fn cached_evaluation_issues_one_request() {
    let transport = Arc::new(ScriptedTransport::default().answer(DEFAULT_HOST, F1_RESPONSE));
    let client = client(config(), &transport);
    let context = EvaluationContext::new().targeting_key("u1");

    let first = client.evaluate(&context).await.unwrap();
    let second = client.evaluate(&context).await.unwrap();

    assert_eq!(first.get("f1").unwrap().value, json!(true));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.attempted_hosts(), [DEFAULT_HOST]);
}

#[tokio::test]
async fn failover_tries_every_endpoint_in_order() {
    let transport = Arc::new(ScriptedTransport::default().answer(DEFAULT_HOST, F1_RESPONSE));
    let client = client(
        config().horizon_urls(["https://a.example.com", "https://b.example.com"]),
        &transport,
    );

    let response = client
        .evaluate(&EvaluationContext::new().targeting_key("u1"))
        .await
        .unwrap();

    assert!(response.get("f1").is_some());
    assert_eq!(
        transport.attempted_hosts(),
        ["a.example.com", "b.example.com", DEFAULT_HOST]
    );
}

#[tokio::test]
async fn exhausted_failover_reports_last_endpoint() {
    let transport = Arc::new(ScriptedTransport::default());
    let client = client(config().horizon_urls(["https://a.example.com"]), &transport);

    let err = client
        .evaluate(&EvaluationContext::new().targeting_key("u1"))
        .await
        .unwrap_err();

    match err {
        Error::AllEndpointsFailed { attempts, last } => {
            assert_eq!(attempts, 2);
            assert_eq!(last.url().host_str(), Some(DEFAULT_HOST));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let transport = Arc::new(ScriptedTransport::default().answer(DEFAULT_HOST, F1_RESPONSE));
    let client = client(
        config().cache(CacheConfig::new().ttl(Duration::from_millis(200))),
        &transport,
    );
    let context = EvaluationContext::new().targeting_key("u1");

    client.evaluate(&context).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.cache().get(&context).unwrap(), None);

    client.evaluate(&context).await.unwrap();
    assert_eq!(transport.attempted_hosts().len(), 2);
}

#[tokio::test]
async fn contexts_with_different_targeting_keys_do_not_share_entries() {
    let transport = Arc::new(ScriptedTransport::default().answer(DEFAULT_HOST, F1_RESPONSE));
    let client = client(config(), &transport);

    client
        .evaluate(&EvaluationContext::new().targeting_key("u1"))
        .await
        .unwrap();
    client
        .evaluate(&EvaluationContext::new().targeting_key("u2"))
        .await
        .unwrap();

    assert_eq!(transport.attempted_hosts().len(), 2);
    assert_eq!(client.cache().len(), 2);
}

#[tokio::test]
async fn custom_key_collides_on_ip_address() {
    let transport = Arc::new(ScriptedTransport::default().answer(DEFAULT_HOST, F1_RESPONSE));
    let client = client(
        config().cache(CacheConfig::new().key_fn(|context| {
            context
                .ip_address
                .clone()
                .unwrap_or_else(|| "default".to_owned())
        })),
        &transport,
    );

    let first = EvaluationContext::new()
        .targeting_key("u1")
        .ip_address("192.0.2.1");
    let second = EvaluationContext::new()
        .targeting_key("u2")
        .ip_address("192.0.2.1")
        .custom_attribute("beta", true);

    client.evaluate(&first).await.unwrap();
    client.evaluate(&second).await.unwrap();

    assert_eq!(transport.attempted_hosts().len(), 1);
}

#[test]
fn equal_contexts_have_equal_default_keys() {
    let client = ToggleClient::with_transport(config(), Arc::new(ScriptedTransport::default()))
        .unwrap();

    let mut attributes = Attributes::new();
    attributes.insert("tier".to_owned(), "gold".into());
    attributes.insert("age".to_owned(), 42.into());

    let tags = AttributeValue::List(vec!["a".into(), "b".into()]);

    let a = EvaluationContext::new()
        .targeting_key("u1")
        .custom_attribute("profile", AttributeValue::Map(attributes.clone()))
        .user(
            UserContext::new()
                .id("u1")
                .custom_attribute("tags", tags.clone()),
        );
    let b = EvaluationContext::new()
        .user(UserContext::new().custom_attribute("tags", tags).id("u1"))
        .custom_attribute("profile", AttributeValue::Map(attributes))
        .targeting_key("u1");

    let key_a = default_cache_key(&client.build_payload(&a).unwrap());
    let key_b = default_cache_key(&client.build_payload(&b).unwrap());

    assert_eq!(key_a, key_b);
    assert_eq!(client.cache().cache_key(&a).unwrap(), key_a);
}
