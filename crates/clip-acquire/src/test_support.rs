//! In-memory fakes for the upstream, token store and clip sink

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use helix::{ClipInfo, CreatedClip, Upstream, UpstreamFuture};
use twitch_auth::{AccessCredential, Scope, TokenResponse, TokenStore, now_millis};

use crate::outcome::ClipOutcome;
use crate::sink::ClipSink;

pub fn credential(account_id: &str, expires_at: u64) -> AccessCredential {
    AccessCredential {
        account_id: account_id.into(),
        access_token: format!("at_{account_id}").into(),
        refresh_token: format!("rt_{account_id}").into(),
        expires_at,
        scopes: "clips:edit".into(),
        token_type: "bearer".into(),
    }
}

/// A credential valid for the next hour.
pub fn fresh_credential(account_id: &str) -> AccessCredential {
    credential(account_id, now_millis() + 3_600_000)
}

pub fn unauthorized() -> helix::Error {
    helix::Error::Status {
        status: 401,
        body: r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#.into(),
    }
}

pub fn pending(clip_id: &str) -> helix::Result<ClipInfo> {
    Ok(ClipInfo {
        clip_id: clip_id.into(),
        url: None,
    })
}

pub fn ready(clip_id: &str, url: &str) -> helix::Result<ClipInfo> {
    Ok(ClipInfo {
        clip_id: clip_id.into(),
        url: Some(url.into()),
    })
}

/// Scripted upstream. Each queue is consumed front to back; an empty create
/// queue yields clip "abc123", an empty lookup queue yields "not ready" and an
/// empty refresh queue yields a fresh four-hour token.
#[derive(Default)]
pub struct FakeUpstream {
    creates: Mutex<VecDeque<helix::Result<CreatedClip>>>,
    lookups: Mutex<VecDeque<helix::Result<ClipInfo>>>,
    refreshes: Mutex<VecDeque<helix::Result<TokenResponse>>>,
    create_tokens: Mutex<Vec<String>>,
    pub create_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_create(&self, result: helix::Result<CreatedClip>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn push_lookup(&self, result: helix::Result<ClipInfo>) {
        self.lookups.lock().unwrap().push_back(result);
    }

    pub fn push_refresh(&self, result: helix::Result<TokenResponse>) {
        self.refreshes.lock().unwrap().push_back(result);
    }

    /// Access tokens presented to `create_clip`, in call order.
    pub fn create_tokens(&self) -> Vec<String> {
        self.create_tokens.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.creates() + self.lookups() + self.refreshes()
    }
}

impl Upstream for FakeUpstream {
    fn create_clip<'a>(
        &'a self,
        access_token: &'a str,
        _broadcaster_id: &'a str,
    ) -> UpstreamFuture<'a, CreatedClip> {
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.create_tokens
                .lock()
                .unwrap()
                .push(access_token.to_string());
            self.creates
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(CreatedClip {
                        clip_id: "abc123".into(),
                    })
                })
        })
    }

    fn get_clip<'a>(
        &'a self,
        _access_token: &'a str,
        clip_id: &'a str,
    ) -> UpstreamFuture<'a, ClipInfo> {
        Box::pin(async move {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.lookups
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| pending(clip_id))
        })
    }

    fn refresh_credential<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> UpstreamFuture<'a, TokenResponse> {
        Box::pin(async move {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(TokenResponse {
                        access_token: format!("at_refreshed_{n}"),
                        refresh_token: format!("rt_rotated_{n}"),
                        expires_in: 14_400,
                        scope: Scope::List(vec!["clips:edit".into()]),
                        token_type: "bearer".into(),
                    })
                })
        })
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, AccessCredential>>,
    pub upserts: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn with(credentials: Vec<AccessCredential>) -> Self {
        let tokens = credentials
            .into_iter()
            .map(|c| (c.account_id.clone(), c))
            .collect();
        Self {
            tokens: Mutex::new(tokens),
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn current(&self, account_id: &str) -> Option<AccessCredential> {
        self.tokens.lock().unwrap().get(account_id).cloned()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = twitch_auth::Result<Option<AccessCredential>>> + Send + 'a>>
    {
        Box::pin(async move { Ok(self.current(account_id)) })
    }

    fn upsert_token(
        &self,
        credential: AccessCredential,
    ) -> Pin<Box<dyn Future<Output = twitch_auth::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.tokens
                .lock()
                .unwrap()
                .insert(credential.account_id.clone(), credential);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MemoryClipSink {
    records: Mutex<Vec<ClipOutcome>>,
}

impl MemoryClipSink {
    pub fn records(&self) -> Vec<ClipOutcome> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl ClipSink for MemoryClipSink {
    fn save_clip(
        &self,
        outcome: ClipOutcome,
    ) -> Pin<Box<dyn Future<Output = crate::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.records.lock().unwrap().push(outcome);
            Ok(())
        })
    }
}

/// Sink that rejects every append.
pub struct BrokenSink;

impl ClipSink for BrokenSink {
    fn save_clip(
        &self,
        _outcome: ClipOutcome,
    ) -> Pin<Box<dyn Future<Output = crate::Result<()>> + Send + '_>> {
        Box::pin(async { Err(crate::Error::Sink("disk full".into())) })
    }
}
