//! A single HTTP attempt against one Horizon endpoint.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use url::Url;

use crate::{error::EndpointFailure, Error, Result};

const API_KEY_HEADER: &str = "x-api-key";

/// Sends one JSON POST request and returns the response body.
///
/// Implementations must treat connection errors, timeouts and non-2xx statuses as
/// [`EndpointFailure`]s. They must not retry: failover across endpoints is handled by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` and return the response body of a 2xx response.
    async fn post(&self, url: Url, body: Vec<u8>) -> std::result::Result<String, EndpointFailure>;
}

/// [`Transport`] backed by a shared `reqwest` client.
pub struct HttpTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport that authenticates every request with `public_key` and gives up on an
    /// attempt after `timeout`.
    pub fn new(public_key: &str, timeout: Duration) -> Result<HttpTransport> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(public_key).map_err(|_| {
            Error::InvalidConfiguration("public key is not a valid header value".to_owned())
        })?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .user_agent(concat!("hyphen-toggle-rust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                Error::InvalidConfiguration(format!("unable to build http client: {err}"))
            })?;

        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: Url, body: Vec<u8>) -> std::result::Result<String, EndpointFailure> {
        let response = self
            .client
            .post(url.clone())
            .body(body)
            .send()
            .await
            .map_err(|err| EndpointFailure::from_reqwest(url.clone(), err))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| EndpointFailure::from_reqwest(url.clone(), err))?;

        if !status.is_success() {
            return Err(EndpointFailure::Status {
                url,
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}
