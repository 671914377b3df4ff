use std::{fmt, sync::Arc, time::Duration};

use regex::Regex;

use crate::{Error, EvaluationContext, Result, ToggleClient, ToggleProvider};

/// A user-supplied cache key derivation. Receives the caller's raw context.
pub type CacheKeyFn = Arc<dyn Fn(&EvaluationContext) -> String + Send + Sync>;

/// Configuration for the evaluation response cache.
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) ttl: Duration,
    pub(crate) max_entries: Option<usize>,
    pub(crate) key_fn: Option<CacheKeyFn>,
}

impl CacheConfig {
    /// Default value for [`CacheConfig::ttl`].
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

    /// Create a default cache configuration: 30 second TTL, no size bound, default key.
    pub fn new() -> CacheConfig {
        CacheConfig::default()
    }

    /// How long a fetched response is served from cache.
    pub fn ttl(mut self, ttl: Duration) -> CacheConfig {
        self.ttl = ttl;
        self
    }

    /// Bound the number of cached responses to exactly `max_entries`. Once full, the
    /// least-recently-used entry is evicted first. A bound of zero is treated as one.
    ///
    /// The cache is unbounded by default and only evicts expired entries.
    pub fn max_entries(mut self, max_entries: usize) -> CacheConfig {
        self.max_entries = Some(max_entries);
        self
    }

    /// Replace the default cache key (a hash of the normalized context) with a custom function.
    ///
    /// The function decides which contexts share a cached response, so it must include
    /// everything the evaluation depends on.
    ///
    /// ```
    /// # use hyphen_toggle::CacheConfig;
    /// let cache = CacheConfig::new().key_fn(|context| {
    ///     context.ip_address.clone().unwrap_or_else(|| "default".to_owned())
    /// });
    /// ```
    pub fn key_fn(
        mut self,
        key_fn: impl Fn(&EvaluationContext) -> String + Send + Sync + 'static,
    ) -> CacheConfig {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            ttl: CacheConfig::DEFAULT_TTL,
            max_entries: None,
            key_fn: None,
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

/// Configuration for [`ToggleClient`] and [`ToggleProvider`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) public_key: String,
    pub(crate) application: String,
    pub(crate) environment: String,
    pub(crate) horizon_urls: Vec<String>,
    pub(crate) cache: CacheConfig,
    pub(crate) request_timeout: Duration,
    pub(crate) enable_toggle_usage: bool,
}

impl ClientConfig {
    /// Default value for [`ClientConfig::request_timeout`].
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a default configuration for the given public key and project scope.
    ///
    /// ```
    /// # use hyphen_toggle::ClientConfig;
    /// ClientConfig::new("public_key", "my-app", "production");
    /// ```
    pub fn new(
        public_key: impl Into<String>,
        application: impl Into<String>,
        environment: impl Into<String>,
    ) -> ClientConfig {
        ClientConfig {
            public_key: public_key.into(),
            application: application.into(),
            environment: environment.into(),
            horizon_urls: Vec::new(),
            cache: CacheConfig::default(),
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
            enable_toggle_usage: true,
        }
    }

    /// Additional Horizon base URLs, tried in order before the default URL derived from the
    /// public key.
    pub fn horizon_urls<I, S>(mut self, urls: I) -> ClientConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.horizon_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Configure the evaluation response cache.
    pub fn cache(mut self, cache: CacheConfig) -> ClientConfig {
        self.cache = cache;
        self
    }

    /// Timeout of a single HTTP attempt. An attempt that times out counts as a failed endpoint.
    pub fn request_timeout(mut self, timeout: Duration) -> ClientConfig {
        self.request_timeout = timeout;
        self
    }

    /// Whether [`ToggleProvider`] reports resolved toggles to the telemetry endpoint.
    pub fn enable_toggle_usage(mut self, enable: bool) -> ClientConfig {
        self.enable_toggle_usage = enable;
        self
    }

    /// Check that the configuration is usable. Called when a client is created.
    pub fn validate(&self) -> Result<()> {
        if self.public_key.is_empty() {
            return Err(Error::InvalidConfiguration(
                "public key must not be empty".to_owned(),
            ));
        }
        if self.application.is_empty() {
            return Err(Error::InvalidConfiguration(
                "application must not be empty".to_owned(),
            ));
        }
        if !is_valid_environment(&self.environment) {
            return Err(Error::InvalidConfiguration(format!(
                "environment {:?} must be a project environment id (pevr_...) or an alternate id \
                 of 1-25 lowercase letters, digits, hyphens or underscores",
                self.environment
            )));
        }
        if self.cache.ttl.is_zero() {
            return Err(Error::InvalidConfiguration(
                "cache ttl must be greater than zero".to_owned(),
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(Error::InvalidConfiguration(
                "cache max_entries must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Create a new [`ToggleClient`] using this configuration.
    pub fn to_client(self) -> Result<ToggleClient> {
        ToggleClient::new(self)
    }

    /// Create a new [`ToggleProvider`] using this configuration.
    pub fn to_provider(self) -> Result<ToggleProvider> {
        ToggleProvider::new(self)
    }
}

fn is_valid_environment(environment: &str) -> bool {
    let project_environment_id =
        Regex::new(r"^pevr_[a-zA-Z0-9]+$").expect("environment id regex should compile");
    let alternate_id =
        Regex::new(r"^[a-z0-9_-]{1,25}$").expect("alternate id regex should compile");
    project_environment_id.is_match(environment) || alternate_id.is_match(environment)
}
