//! Credential lifecycle for clip requests
//!
//! The manager borrows a credential from the token store for one call and
//! never caches it. Expired credentials are refreshed before use, and every
//! refresh produces a brand-new record that replaces the stored one.

use std::sync::Arc;

use helix::Upstream;
use tracing::{debug, info, warn};
use twitch_auth::{AccessCredential, TokenStore, now_millis};

use crate::error::{Error, Result};

/// Hands out usable credentials for an account.
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn TokenStore>,
    upstream: Arc<dyn Upstream>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn TokenStore>, upstream: Arc<dyn Upstream>) -> Self {
        Self { store, upstream }
    }

    /// Stored credential for `account_id`, refreshed first when its expiry is
    /// at or before now.
    pub async fn ensure(&self, account_id: &str) -> Result<AccessCredential> {
        let stored = self
            .store
            .get_token(account_id)
            .await?
            .ok_or_else(|| Error::NoCredential(account_id.to_string()))?;

        if stored.is_expired(now_millis()) {
            debug!(account_id, expires_at = stored.expires_at, "credential expired, refreshing");
            return self.refresh_and_store(&stored).await;
        }

        Ok(stored)
    }

    /// Exchange `current`'s refresh token, persist the replacement and return it.
    ///
    /// A non-2xx answer from the token endpoint becomes `RefreshFailed` with
    /// the upstream status and body.
    pub async fn refresh_and_store(&self, current: &AccessCredential) -> Result<AccessCredential> {
        let account_id = current.account_id.as_str();
        let response = match self
            .upstream
            .refresh_credential(current.refresh_token.expose())
            .await
        {
            Ok(response) => response,
            Err(helix::Error::Status { status, body }) => {
                warn!(account_id, status, "refresh token rejected");
                metrics::counter!("clip_token_refreshes_total", "result" => "rejected").increment(1);
                return Err(Error::RefreshFailed { status, body });
            }
            Err(e) => {
                warn!(account_id, error = %e, "token refresh failed");
                metrics::counter!("clip_token_refreshes_total", "result" => "error").increment(1);
                return Err(Error::Upstream(e));
            }
        };

        let refreshed = AccessCredential::from_refresh(account_id, response, now_millis());
        self.store.upsert_token(refreshed.clone()).await?;

        metrics::counter!("clip_token_refreshes_total", "result" => "ok").increment(1);
        info!(account_id, expires_at = refreshed.expires_at, "credential refreshed");
        Ok(refreshed)
    }
}
