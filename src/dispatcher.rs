//! Ordered failover across Horizon endpoints.
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{error::EndpointFailure, transport::Transport, Error, Result};

/// Posts a request to each endpoint in order until one succeeds.
///
/// Every request starts from the first endpoint. There are no retries against the same endpoint
/// and no delay between attempts.
pub struct EndpointDispatcher {
    endpoints: Vec<Url>,
    transport: Arc<dyn Transport>,
}

impl EndpointDispatcher {
    /// Create a dispatcher trying `endpoints` in the given order.
    pub fn new(endpoints: Vec<Url>, transport: Arc<dyn Transport>) -> EndpointDispatcher {
        EndpointDispatcher {
            endpoints,
            transport,
        }
    }

    /// Endpoints in failover order.
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// POST `payload` as JSON to `path` on each endpoint until one returns a 2xx response.
    ///
    /// Returns the first successful response body. If every endpoint fails, returns
    /// [`Error::AllEndpointsFailed`] carrying the failure of the last endpoint. If `cancel` fires
    /// while an attempt is in flight, the attempt is dropped and [`Error::Cancelled`] is returned
    /// without trying the remaining endpoints.
    pub async fn dispatch<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let body =
            serde_json::to_vec(payload).map_err(|err| Error::Serialization(Arc::new(err)))?;
        let path = path.trim_start_matches('/');

        let mut last_failure = None;
        for base in &self.endpoints {
            let failure = match base.join(path) {
                Ok(url) => {
                    log::debug!(target: "hyphen", url:display = url; "sending horizon request");
                    let attempt = self.transport.post(url, body.clone());
                    let result = match cancel {
                        Some(token) => tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                log::debug!(target: "hyphen", path; "horizon request cancelled");
                                return Err(Error::Cancelled);
                            }
                            result = attempt => result,
                        },
                        None => attempt.await,
                    };
                    match result {
                        Ok(response) => return Ok(response),
                        Err(failure) => failure,
                    }
                }
                Err(source) => EndpointFailure::InvalidUrl {
                    base: base.clone(),
                    source,
                },
            };

            log::warn!(target: "hyphen", endpoint:display = base; "horizon request failed: {}", failure);
            last_failure = Some(failure);
        }

        match last_failure {
            Some(last) => {
                log::warn!(target: "hyphen", path; "all horizon endpoints failed");
                Err(Error::AllEndpointsFailed {
                    attempts: self.endpoints.len(),
                    last,
                })
            }
            None => Err(Error::NoEndpoints),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::HashMap, sync::Mutex, time::Duration};

    use async_trait::async_trait;

    use super::*;

    /// Recording transport that answers per host and remembers every attempt.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        responses: HashMap<String, std::result::Result<String, u16>>,
        delay: Option<Duration>,
        pub(crate) requests: Mutex<Vec<(Url, serde_json::Value)>>,
    }

    impl FakeTransport {
        pub(crate) fn respond(mut self, host: &str, body: &str) -> Self {
            self.responses
                .insert(host.to_owned(), Ok(body.to_owned()));
            self
        }

        pub(crate) fn fail(mut self, host: &str, status: u16) -> Self {
            self.responses.insert(host.to_owned(), Err(status));
            self
        }

        pub(crate) fn delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn attempted_hosts(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.host_str().unwrap_or_default().to_owned())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post(
            &self,
            url: Url,
            body: Vec<u8>,
        ) -> std::result::Result<String, EndpointFailure> {
            self.requests
                .lock()
                .unwrap()
                .push((url.clone(), serde_json::from_slice(&body).unwrap()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.responses.get(url.host_str().unwrap_or_default()) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(EndpointFailure::Status {
                    url,
                    status: *status,
                    body: "unavailable".to_owned(),
                }),
                None => Err(EndpointFailure::Timeout { url }),
            }
        }
    }

    fn endpoints(hosts: &[&str]) -> Vec<Url> {
        hosts
            .iter()
            .map(|host| Url::parse(&format!("https://{host}/")).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn fails_over_in_order_until_success() {
        let transport = Arc::new(
            FakeTransport::default()
                .fail("a", 500)
                .fail("b", 503)
                .respond("c", "from c"),
        );
        let dispatcher = EndpointDispatcher::new(endpoints(&["a", "b", "c"]), transport.clone());

        let response = dispatcher
            .dispatch("/toggle/evaluate", &serde_json::json!({"x": 1}), None)
            .await
            .unwrap();

        assert_eq!(response, "from c");
        assert_eq!(transport.attempted_hosts(), ["a", "b", "c"]);
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[2].0.as_str(), "https://c/toggle/evaluate");
        assert_eq!(requests[2].1, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let transport = Arc::new(FakeTransport::default().respond("a", "from a"));
        let dispatcher = EndpointDispatcher::new(endpoints(&["a", "b"]), transport.clone());

        dispatcher
            .dispatch("/toggle/evaluate", &(), None)
            .await
            .unwrap();

        assert_eq!(transport.attempted_hosts(), ["a"]);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_endpoint() {
        let transport = Arc::new(FakeTransport::default().fail("a", 500).fail("b", 502));
        let dispatcher = EndpointDispatcher::new(endpoints(&["a", "b"]), transport.clone());

        let err = dispatcher
            .dispatch("/toggle/evaluate", &(), None)
            .await
            .unwrap_err();

        match err {
            Error::AllEndpointsFailed { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.url().host_str(), Some("b"));
                assert!(matches!(last, EndpointFailure::Status { status: 502, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn each_request_restarts_from_first_endpoint() {
        let transport = Arc::new(FakeTransport::default().fail("a", 500).respond("b", "ok"));
        let dispatcher = EndpointDispatcher::new(endpoints(&["a", "b"]), transport.clone());

        dispatcher.dispatch("toggle/evaluate", &(), None).await.unwrap();
        dispatcher.dispatch("toggle/evaluate", &(), None).await.unwrap();

        assert_eq!(transport.attempted_hosts(), ["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn keeps_base_path_of_endpoint() {
        let transport = Arc::new(FakeTransport::default().respond("a", "ok"));
        let dispatcher = EndpointDispatcher::new(
            vec![Url::parse("https://a/horizon/").unwrap()],
            transport.clone(),
        );

        dispatcher.dispatch("/toggle/telemetry", &(), None).await.unwrap();

        assert_eq!(
            transport.requests.lock().unwrap()[0].0.as_str(),
            "https://a/horizon/toggle/telemetry"
        );
    }

    #[tokio::test]
    async fn empty_endpoint_list() {
        let dispatcher = EndpointDispatcher::new(vec![], Arc::new(FakeTransport::default()));
        assert!(matches!(
            dispatcher.dispatch("toggle/evaluate", &(), None).await,
            Err(Error::NoEndpoints)
        ));
    }

    #[tokio::test]
    async fn cancellation_aborts_without_failover() {
        let transport = Arc::new(
            FakeTransport::default()
                .fail("a", 500)
                .respond("b", "ok")
                .delay(Duration::from_secs(60)),
        );
        let dispatcher = EndpointDispatcher::new(endpoints(&["a", "b"]), transport.clone());
        let token = CancellationToken::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = dispatcher
            .dispatch("toggle/evaluate", &(), Some(&token))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.attempted_hosts(), ["a"]);
    }

    #[tokio::test]
    async fn already_cancelled_token_makes_no_attempt_succeed() {
        let transport = Arc::new(FakeTransport::default().respond("a", "ok"));
        let dispatcher = EndpointDispatcher::new(endpoints(&["a"]), transport);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            dispatcher.dispatch("toggle/evaluate", &(), Some(&token)).await,
            Err(Error::Cancelled)
        ));
    }
}
