//! Typed client for the Twitch Helix clip endpoints
//!
//! Defines the `Upstream` trait that decouples clip acquisition from the HTTP
//! transport. `HelixClient` implements it with reqwest; tests substitute an
//! in-memory fake. Each call issues exactly one request: whether a 401 should
//! lead to a credential refresh is the caller's decision, not the client's.

pub mod client;
pub mod error;

pub use client::{DEFAULT_API_BASE, HelixClient};
pub use error::{Error, Result};

use std::future::Future;
use std::pin::Pin;

use twitch_auth::TokenResponse;

/// Boxed future returned by `Upstream` methods.
pub type UpstreamFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A clip the upstream accepted for creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedClip {
    pub clip_id: String,
}

/// Lookup state of a clip. `url` is `None` until the asset is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipInfo {
    pub clip_id: String,
    pub url: Option<String>,
}

/// The three upstream operations clip acquisition depends on.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Upstream>`).
pub trait Upstream: Send + Sync {
    /// `POST /clips?broadcaster_id=<id>`
    fn create_clip<'a>(
        &'a self,
        access_token: &'a str,
        broadcaster_id: &'a str,
    ) -> UpstreamFuture<'a, CreatedClip>;

    /// `GET /clips?id=<clip_id>`
    fn get_clip<'a>(&'a self, access_token: &'a str, clip_id: &'a str)
    -> UpstreamFuture<'a, ClipInfo>;

    /// `POST oauth2/token` with `grant_type=refresh_token`
    fn refresh_credential<'a>(&'a self, refresh_token: &'a str)
    -> UpstreamFuture<'a, TokenResponse>;
}
