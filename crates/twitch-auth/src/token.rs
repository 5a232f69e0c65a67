//! OAuth refresh-token grant
//!
//! POSTs `grant_type=refresh_token` to the Twitch identity endpoint. Twitch
//! may rotate the refresh token on every call, so callers must persist the
//! returned pair rather than reuse the old refresh token.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::CLIENT_ID_HEADER;
use crate::error::{Error, Result};
use crate::secret::Secret;

/// Application credentials registered with Twitch.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

/// Granted scopes. Twitch documents a list, but some responses carry a
/// single space- or comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scope {
    List(Vec<String>),
    Single(String),
}

impl Scope {
    /// Flatten to the comma-joined form stored with the credential.
    pub fn joined(&self) -> String {
        match self {
            Scope::List(scopes) => scopes.join(","),
            Scope::Single(scope) => scope.clone(),
        }
    }
}

/// Response from the token endpoint for a refresh.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts this to an absolute unix millisecond timestamp when storing
/// the credential.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    pub scope: Scope,
    pub token_type: String,
}

/// Exchange a refresh token for a fresh access/refresh pair.
///
/// Any non-2xx answer is returned as `Error::Rejected` with the status and
/// raw body so the caller can decide whether the credential is revoked.
pub async fn refresh_token(
    client: &reqwest::Client,
    endpoint: &str,
    app: &ClientCredentials,
    refresh: &str,
) -> Result<TokenResponse> {
    debug!(endpoint, "requesting token refresh");
    let response = client
        .post(endpoint)
        .header(CLIENT_ID_HEADER, &app.client_id)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))
}
