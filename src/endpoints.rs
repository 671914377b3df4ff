//! Horizon endpoint list construction.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use url::Url;

use crate::{Error, Result};

/// Generic Horizon URL, used when no organization can be derived from the public key.
pub const DEFAULT_HORIZON_URL: &str = "https://toggle.hyphen.cloud";

const PUBLIC_KEY_PREFIX: &str = "public_";

/// Extract the organization id embedded in a public key.
///
/// A public key is `public_` followed by base64 of `<org id>:<secret>`. Returns `None` if the key
/// doesn't decode or the org id contains anything but letters, digits, `_` and `-`.
pub fn org_id_from_public_key(public_key: &str) -> Option<String> {
    let encoded = public_key
        .strip_prefix(PUBLIC_KEY_PREFIX)
        .unwrap_or(public_key);
    let decoded = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let org_id = decoded.split(':').next()?;

    let valid = Regex::new(r"^[a-zA-Z0-9_-]+$").expect("org id regex should compile");
    valid.is_match(org_id).then(|| org_id.to_owned())
}

/// Horizon URL for the organization the public key belongs to, or [`DEFAULT_HORIZON_URL`].
pub fn default_horizon_url(public_key: &str) -> String {
    match org_id_from_public_key(public_key) {
        Some(org_id) => format!("https://{org_id}.toggle.hyphen.cloud"),
        None => {
            log::warn!(target: "hyphen", "unable to derive organization from public key, using {}", DEFAULT_HORIZON_URL);
            DEFAULT_HORIZON_URL.to_owned()
        }
    }
}

/// Build the ordered failover list: caller overrides first, in the given order, then the URL
/// derived from the public key.
pub fn build_endpoint_list(public_key: &str, overrides: &[String]) -> Result<Vec<Url>> {
    let derived = default_horizon_url(public_key);
    overrides
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(derived.as_str()))
        .map(parse_base_url)
        .collect()
}

/// Parse a base URL, making sure it ends with `/` so that joining a path keeps any base path.
fn parse_base_url(url: &str) -> Result<Url> {
    let normalized = if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{url}/")
    };
    Url::parse(&normalized).map_err(Error::InvalidBaseUrl)
}
