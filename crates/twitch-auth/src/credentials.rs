//! Credential storage for OAuth tokens
//!
//! Manages a JSON file mapping account (broadcaster) IDs to OAuth credentials.
//! All writes use atomic temp-file + rename to prevent corruption on crash. A
//! tokio Mutex serializes concurrent writes from overlapping clip requests and
//! background polls that refresh the same account.
//!
//! Credentials are replaced wholesale on every refresh; the store never patches
//! individual fields of a stored record.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::secret::Secret;
use crate::token::TokenResponse;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A single account's OAuth credential.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed from the server-reported `expires_in` at the moment the token
/// response was received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCredential {
    pub account_id: String,
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
    /// Granted scopes, comma-joined
    pub scopes: String,
    pub token_type: String,
}

impl AccessCredential {
    /// Build the replacement credential from a refresh response.
    ///
    /// Every field comes from the response; nothing is carried over from the
    /// previous credential except the account id.
    pub fn from_refresh(account_id: &str, response: TokenResponse, now_millis: u64) -> Self {
        Self {
            account_id: account_id.to_string(),
            access_token: Secret::new(response.access_token),
            refresh_token: Secret::new(response.refresh_token),
            expires_at: now_millis.saturating_add(response.expires_in.saturating_mul(1000)),
            scopes: response.scope.joined(),
            token_type: response.token_type,
        }
    }

    /// Whether the access token is at or past its expiry.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at <= now_millis
    }
}

/// Read/write access to stored credentials, keyed by account id.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Fetch the stored credential for an account, if any.
    fn get_token<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AccessCredential>>> + Send + 'a>>;

    /// Insert or fully replace the credential for `credential.account_id`.
    fn upsert_token(
        &self,
        credential: AccessCredential,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Thread-safe credential file manager.
///
/// The Mutex serializes all writes. Reads acquire the lock briefly to clone
/// the in-memory state.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, AccessCredential>>,
}

impl CredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// accounts). Clip requests fail with "no credential" until the operator
    /// seeds the file.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let mut credentials: HashMap<String, AccessCredential> =
                serde_json::from_str(&contents)
                    .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            // The map key is authoritative for the account id
            for (id, credential) in credentials.iter_mut() {
                credential.account_id.clone_from(id);
            }
            info!(path = %path.display(), accounts = credentials.len(), "loaded credentials");
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let store = HashMap::new();
            write_atomic(&path, &store).await?;
            store
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific credential.
    pub async fn get(&self, account_id: &str) -> Option<AccessCredential> {
        let state = self.state.lock().await;
        state.get(account_id).cloned()
    }

    /// Insert or replace a credential and persist to disk.
    pub async fn upsert(&self, credential: AccessCredential) -> Result<()> {
        let mut state = self.state.lock().await;
        let account_id = credential.account_id.clone();
        state.insert(account_id.clone(), credential);
        debug!(account_id, "stored credential");
        write_atomic(&self.path, &state).await
    }

    /// Number of stored credentials.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenStore for CredentialStore {
    fn get_token<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AccessCredential>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.get(account_id).await) })
    }

    fn upsert_token(
        &self,
        credential: AccessCredential,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.upsert(credential))
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains OAuth tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, AccessCredential>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
