//! Rust client for Hyphen Toggle, a feature flag evaluation service.
//!
//! # Overview
//!
//! The client revolves around a [`ToggleClient`] that evaluates toggles remotely for an
//! [`EvaluationContext`]: the subject being evaluated (targeting key, user, IP address) and
//! arbitrary nested custom attributes. Evaluation results in an [`EvaluationResponse`] holding an
//! [`Evaluation`] per toggle.
//!
//! The request pipeline is:
//!
//! 1. [`ContextNormalizer`] turns the context into a canonical [`CachePayload`], filling in the
//!    application and environment from [`ClientConfig`].
//! 2. [`ResponseCache`](cache::ResponseCache) returns a previous response for the same context if it
//!    hasn't expired. By default, the cache key is a SHA-256 hash of the canonical payload.
//! 3. On a miss, [`EndpointDispatcher`](dispatcher::EndpointDispatcher) posts the payload to the
//!    configured Horizon URLs in order until one answers. The URL derived from the public key is
//!    always tried last.
//!
//! [`ToggleProvider`] wraps the client for feature flag frameworks: it resolves typed values, falls
//! back to the caller's default on any error, and reports resolved toggles to the telemetry
//! endpoint.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. The client never swallows errors: a failure is
//! either recovered by trying the next endpoint or returned to the caller.
//!
//! In production, it is recommended to fall back to a default value on any error, as toggle
//! evaluation should not be critical enough to cause failures. [`ToggleProvider`] does exactly
//! that.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `hyphen` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into client operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod cache;
pub mod dispatcher;
pub mod endpoints;
pub mod provider;
pub mod transport;

mod attributes;
mod client;
mod config;
mod context;
mod error;
mod evaluation;
mod payload;

pub use attributes::{AttributeValue, Attributes};
pub use client::ToggleClient;
pub use config::{CacheConfig, CacheKeyFn, ClientConfig};
pub use context::{EvaluationContext, UserContext};
pub use error::{ConversionError, EndpointFailure, Error, Result};
pub use evaluation::{Evaluation, EvaluationResponse, ToggleType};
pub use payload::{CachePayload, ContextNormalizer, TelemetryData, TelemetryPayload, UserPayload};
pub use provider::{ResolutionDetails, ToggleProvider};

pub use tokio_util::sync::CancellationToken;
