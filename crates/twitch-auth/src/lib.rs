//! Twitch OAuth credential library
//!
//! Holds the per-account credential model, the refresh-token grant against the
//! Twitch identity endpoint, and the JSON file store that persists credentials
//! between process runs.
//!
//! Credential flow:
//! 1. Operator seeds the credential file (authorization-code exchange happens elsewhere)
//! 2. `TokenStore::get_token()` hands out the stored credential for an account
//! 3. `token::refresh_token()` obtains a replacement when the access token expires
//! 4. `AccessCredential::from_refresh()` builds the new record, which fully
//!    supersedes the old one via `TokenStore::upsert_token()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod secret;
pub mod token;

pub use constants::*;
pub use credentials::{AccessCredential, CredentialStore, TokenStore, now_millis};
pub use error::{Error, Result};
pub use secret::Secret;
pub use token::{ClientCredentials, Scope, TokenResponse, refresh_token};
