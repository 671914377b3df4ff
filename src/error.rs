use std::sync::Arc;

use url::Url;

/// Represents a result type for operations in the Hyphen Toggle client.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while evaluating toggles.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A context attribute could not be converted to its wire form.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Every configured endpoint was tried and failed. Holds the failure of the last endpoint.
    #[error("all {attempts} horizon endpoints failed, last error: {last}")]
    AllEndpointsFailed {
        /// Number of endpoints attempted.
        attempts: usize,
        /// Failure reported by the last endpoint in the list.
        #[source]
        last: EndpointFailure,
    },

    /// The dispatcher has no endpoints to try.
    #[error("no horizon endpoints configured")]
    NoEndpoints,

    /// The service answered with a success status but the body could not be parsed.
    #[error("failed to parse evaluation response")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    ResponseParse(#[source] Arc<serde_json::Error>),

    /// A request payload could not be serialized.
    #[error("failed to serialize request payload")]
    Serialization(#[source] Arc<serde_json::Error>),

    /// The evaluation response does not contain the requested toggle.
    #[error("toggle {0:?} not found")]
    FlagNotFound(String),

    /// The request was cancelled by the caller while endpoints were being tried.
    #[error("evaluation request was cancelled")]
    Cancelled,

    /// Client configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A horizon URL could not be parsed.
    #[error("invalid horizon url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),
}

/// A context attribute value that has no JSON representation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("cannot convert attribute {path:?}: {reason}")]
pub struct ConversionError {
    /// Dotted path of the offending attribute, e.g. `customAttributes.score`.
    pub path: String,
    /// What was wrong with the value.
    pub reason: String,
}

impl ConversionError {
    pub(crate) fn new(path: impl Into<String>, reason: impl Into<String>) -> ConversionError {
        ConversionError {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A single failed HTTP attempt against one endpoint.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum EndpointFailure {
    /// Connection or protocol failure.
    #[error("request to {url} failed")]
    Network {
        /// Endpoint URL that was requested.
        url: Url,
        /// Underlying transport error.
        #[source]
        source: Arc<reqwest::Error>,
    },

    /// The attempt exceeded the configured request timeout.
    #[error("request to {url} timed out")]
    Timeout {
        /// Endpoint URL that was requested.
        url: Url,
    },

    /// The service answered with a non-2xx status.
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        /// Endpoint URL that was requested.
        url: Url,
        /// HTTP status code.
        status: u16,
        /// Response body, kept as diagnostic text.
        body: String,
    },

    /// The request path could not be joined onto the endpoint base URL.
    #[error("cannot build request url from {base}")]
    InvalidUrl {
        /// Endpoint base URL.
        base: Url,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },
}

impl EndpointFailure {
    /// URL of the endpoint this failure is attributed to.
    pub fn url(&self) -> &Url {
        match self {
            EndpointFailure::Network { url, .. }
            | EndpointFailure::Timeout { url }
            | EndpointFailure::Status { url, .. } => url,
            EndpointFailure::InvalidUrl { base, .. } => base,
        }
    }

    pub(crate) fn from_reqwest(url: Url, err: reqwest::Error) -> EndpointFailure {
        if err.is_timeout() {
            EndpointFailure::Timeout { url }
        } else {
            EndpointFailure::Network {
                url,
                source: Arc::new(err.without_url()),
            }
        }
    }
}
