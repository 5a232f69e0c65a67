//! End-to-end clip acquisition
//!
//! Per request: cooldown gate, credential ensure, clip create (one retry
//! after a refresh on 401), bounded foreground poll, then an appended outcome
//! record. A foreground poll that runs out of attempts hands the clip id to a
//! detached extended poll before the failure is returned.
//!
//! No lock is held across an upstream call or a poll delay, so requests for
//! different accounts never wait on each other.

use std::sync::Arc;
use std::time::Duration;

use helix::Upstream;
use tracing::{debug, info, warn};

use crate::cooldown::CooldownGate;
use crate::credentials::CredentialManager;
use crate::error::{Error, Result};
use crate::extended::spawn_extended_poll;
use crate::outcome::{Clip, ClipOutcome, ClipRequest};
use crate::sink::ClipSink;

/// Attempt budget and fixed delay for one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Timing knobs for acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireSettings {
    /// Minimum interval between clip requests for one account
    pub cooldown: Duration,
    /// Poll run inside the caller's request
    pub foreground: PollPolicy,
    /// Poll run detached after the foreground poll times out
    pub extended: PollPolicy,
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            foreground: PollPolicy {
                attempts: 12,
                delay: Duration::from_millis(2_500),
            },
            extended: PollPolicy {
                attempts: 10,
                delay: Duration::from_secs(15),
            },
        }
    }
}

/// Composition root for clip requests. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    gate: Arc<CooldownGate>,
    credentials: CredentialManager,
    upstream: Arc<dyn Upstream>,
    sink: Arc<dyn ClipSink>,
    settings: AcquireSettings,
}

impl Orchestrator {
    pub fn new(
        gate: Arc<CooldownGate>,
        credentials: CredentialManager,
        upstream: Arc<dyn Upstream>,
        sink: Arc<dyn ClipSink>,
        settings: AcquireSettings,
    ) -> Self {
        Self {
            gate,
            credentials,
            upstream,
            sink,
            settings,
        }
    }

    /// Request a clip for `request.account_id` and wait for its URL.
    ///
    /// Returns `CooldownActive` without touching the upstream or the sink
    /// while the account's window is open. Any other failure is appended as a
    /// `failed` record before it is returned.
    ///
    /// The workflow runs on its own task. Dropping the returned future stops
    /// the wait, not the acquisition: the outcome is still recorded and a
    /// timed-out poll still hands off to the extended poll.
    pub async fn request_clip(&self, request: ClipRequest) -> Result<Clip> {
        let this = self.clone();
        tokio::spawn(async move { this.run(request).await })
            .await
            .map_err(|e| Error::Aborted(e.to_string()))?
    }

    async fn run(&self, request: ClipRequest) -> Result<Clip> {
        let account_id = request.account_id.as_str();

        if !self
            .gate
            .try_acquire(account_id, self.settings.cooldown)
            .await
        {
            // The window may close between the two calls; callers still need a wait
            let remaining_secs = self.gate.remaining(account_id).await.max(1);
            metrics::counter!("clip_requests_total", "outcome" => "cooldown").increment(1);
            info!(account_id, remaining_secs, "clip request rejected by cooldown");
            return Err(Error::CooldownActive { remaining_secs });
        }

        let record = ClipOutcome::pending(&request);
        let mut clip_id = None;

        match self.acquire(&request, &mut clip_id).await {
            Ok(clip) => {
                self.sink.save_clip(record.succeeded(&clip)).await?;
                metrics::counter!("clip_requests_total", "outcome" => "ok").increment(1);
                info!(account_id, clip_id = %clip.clip_id, url = %clip.url, "clip ready");
                Ok(clip)
            }
            Err(e) => {
                metrics::counter!("clip_requests_total", "outcome" => "failed").increment(1);
                warn!(account_id, clip_id = ?clip_id, error = %e, "clip request failed");

                let failed = record.failed(clip_id, e.to_string());
                if let Err(save_err) = self.sink.save_clip(failed).await {
                    warn!(account_id, error = %save_err, "failed to record clip failure");
                }

                if let Error::PollTimeout { clip_id } = &e {
                    // Handle dropped; the task outlives this request
                    let _ = spawn_extended_poll(
                        self.credentials.clone(),
                        self.upstream.clone(),
                        self.sink.clone(),
                        request.clone(),
                        clip_id.clone(),
                        self.settings.extended,
                    );
                }

                Err(e)
            }
        }
    }

    /// Ensure, create and poll. `clip_id` is filled in as soon as the
    /// upstream accepts the create so failures after that point can record it.
    async fn acquire(&self, request: &ClipRequest, clip_id: &mut Option<String>) -> Result<Clip> {
        let account_id = request.account_id.as_str();
        let mut credential = self.credentials.ensure(account_id).await?;

        let mut allow_refresh = true;
        let created = loop {
            let attempt = self
                .upstream
                .create_clip(credential.access_token.expose(), account_id)
                .await;
            match attempt {
                Ok(created) => break created,
                Err(e) if e.is_unauthorized() && allow_refresh => {
                    warn!(account_id, "clip create unauthorized, refreshing credential");
                    allow_refresh = false;
                    credential = self.credentials.refresh_and_store(&credential).await?;
                }
                Err(e) => return Err(e.into()),
            }
        };

        *clip_id = Some(created.clip_id.clone());
        debug!(account_id, clip_id = %created.clip_id, "clip created, polling for url");

        let policy = self.settings.foreground;
        for attempt in 1..=policy.attempts {
            let info = self
                .upstream
                .get_clip(credential.access_token.expose(), &created.clip_id)
                .await?;
            if let Some(url) = info.url {
                debug!(account_id, clip_id = %created.clip_id, attempt, "clip url available");
                return Ok(Clip {
                    clip_id: created.clip_id,
                    url,
                });
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(Error::PollTimeout {
            clip_id: created.clip_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ClipStatus;
    use crate::test_support::{
        BrokenSink, FakeUpstream, MemoryClipSink, MemoryTokenStore, credential, fresh_credential,
        pending, ready, unauthorized,
    };
    use helix::CreatedClip;

    struct Harness {
        upstream: Arc<FakeUpstream>,
        store: Arc<MemoryTokenStore>,
        sink: Arc<MemoryClipSink>,
        orchestrator: Orchestrator,
    }

    fn harness(store: MemoryTokenStore) -> Harness {
        let upstream = Arc::new(FakeUpstream::new());
        let store = Arc::new(store);
        let sink = Arc::new(MemoryClipSink::default());
        let orchestrator = Orchestrator::new(
            Arc::new(CooldownGate::new()),
            CredentialManager::new(store.clone(), upstream.clone()),
            upstream.clone(),
            sink.clone(),
            AcquireSettings::default(),
        );
        Harness {
            upstream,
            store,
            sink,
            orchestrator,
        }
    }

    fn request(account_id: &str) -> ClipRequest {
        ClipRequest {
            account_id: account_id.into(),
            requested_by: "dashboard".into(),
            requested_by_id: None,
            note: Some("clutch".into()),
        }
    }

    /// Let detached tasks run until the sink holds `count` records.
    async fn wait_for_records(sink: &MemoryClipSink, count: usize) {
        for _ in 0..600 {
            if sink.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("sink never reached {count} records, has {}", sink.len());
    }

    #[tokio::test(start_paused = true)]
    async fn url_on_third_poll_then_cooldown_rejects_second_request() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Ok(CreatedClip {
            clip_id: "abc123".into(),
        }));
        h.upstream.push_lookup(pending("abc123"));
        h.upstream.push_lookup(pending("abc123"));
        h.upstream
            .push_lookup(ready("abc123", "https://clips.example/abc123"));

        let start = tokio::time::Instant::now();
        let clip = h.orchestrator.request_clip(request("x")).await.unwrap();
        assert_eq!(clip.clip_id, "abc123");
        assert_eq!(clip.url, "https://clips.example/abc123");
        assert_eq!(h.upstream.lookups(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(5_000));

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ClipStatus::Ok);
        assert_eq!(records[0].clip_id.as_deref(), Some("abc123"));
        assert_eq!(records[0].url.as_deref(), Some("https://clips.example/abc123"));
        assert_eq!(records[0].note.as_deref(), Some("clutch"));

        let calls_before = h.upstream.total_calls();
        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        match err {
            Error::CooldownActive { remaining_secs } => assert!(remaining_secs > 0),
            other => panic!("expected CooldownActive, got {other:?}"),
        }
        assert_eq!(h.upstream.total_calls(), calls_before);
        assert_eq!(h.sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_is_per_account() {
        let h = harness(MemoryTokenStore::with(vec![
            fresh_credential("a"),
            fresh_credential("b"),
        ]));
        h.upstream.push_lookup(ready("abc123", "https://clips.example/1"));
        h.upstream.push_lookup(ready("abc123", "https://clips.example/2"));

        h.orchestrator.request_clip(request("a")).await.unwrap();
        h.orchestrator.request_clip(request("b")).await.unwrap();
        assert_eq!(h.sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_foreground_hands_off_to_extended_poll() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Ok(CreatedClip {
            clip_id: "xyz".into(),
        }));
        for _ in 0..12 + 3 {
            h.upstream.push_lookup(pending("xyz"));
        }
        h.upstream.push_lookup(ready("xyz", "https://clips.example/xyz"));

        let start = tokio::time::Instant::now();
        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::PollTimeout { ref clip_id } if clip_id == "xyz"));
        assert_eq!(err.to_string(), "Clip URL unavailable after polling");
        assert_eq!(h.upstream.lookups(), 12);
        // Eleven delays between twelve attempts
        assert_eq!(start.elapsed(), Duration::from_millis(27_500));

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ClipStatus::Failed);
        assert_eq!(records[0].clip_id.as_deref(), Some("xyz"));
        assert_eq!(
            records[0].error.as_deref(),
            Some("Clip URL unavailable after polling")
        );

        wait_for_records(&h.sink, 2).await;

        let records = h.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, ClipStatus::Failed);
        assert_eq!(records[1].status, ClipStatus::Ok);
        assert_eq!(records[1].clip_id.as_deref(), Some("xyz"));
        assert_eq!(records[1].url.as_deref(), Some("https://clips.example/xyz"));
        assert_eq!(records[1].requested_by, "dashboard");
        assert_eq!(h.upstream.lookups(), 16);

        // Recovered polls stop
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.upstream.lookups(), 16);
        assert_eq!(h.sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_records_failure_without_upstream_calls() {
        let h = harness(MemoryTokenStore::default());

        let err = h.orchestrator.request_clip(request("nobody")).await.unwrap_err();
        assert!(matches!(err, Error::NoCredential(_)));
        assert_eq!(h.upstream.total_calls(), 0);

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ClipStatus::Failed);
        assert!(records[0].clip_id.is_none());
        assert_eq!(
            records[0].error.as_deref(),
            Some("No tokens found for broadcaster nobody")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_401_triggers_exactly_one_refresh() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Err(unauthorized()));
        h.upstream.push_lookup(ready("abc123", "https://clips.example/abc123"));

        let clip = h.orchestrator.request_clip(request("x")).await.unwrap();
        assert_eq!(clip.clip_id, "abc123");
        assert_eq!(h.upstream.refreshes(), 1);
        assert_eq!(h.upstream.creates(), 2);
        assert_eq!(h.upstream.create_tokens(), vec!["at_x", "at_refreshed_1"]);
        assert_eq!(
            h.store.current("x").unwrap().access_token.expose(),
            "at_refreshed_1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_401_is_terminal() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Err(unauthorized()));
        h.upstream.push_create(Err(unauthorized()));

        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(ref e) if e.is_unauthorized()));
        assert_eq!(h.upstream.refreshes(), 1);
        assert_eq!(h.upstream.creates(), 2);

        let records = h.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ClipStatus::Failed);
        assert!(records[0].clip_id.is_none());
        assert!(records[0].error.as_deref().unwrap().contains("401"));

        // No clip id, so no extended poll
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.upstream.lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_refresh_after_401_is_refresh_failed() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Err(unauthorized()));
        h.upstream.push_refresh(Err(helix::Error::Status {
            status: 400,
            body: "Invalid refresh token".into(),
        }));

        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::RefreshFailed { status: 400, .. }));
        assert_eq!(h.upstream.creates(), 1);
        assert_eq!(
            h.sink.records()[0].error.as_deref(),
            Some("Refresh token failed 400: Invalid refresh token")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_401_create_error_is_not_retried() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Err(helix::Error::Status {
            status: 403,
            body: "missing clips:edit".into(),
        }));

        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert_eq!(h.upstream.creates(), 1);
        assert_eq!(h.upstream.refreshes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_credential_refreshes_once_before_create() {
        let h = harness(MemoryTokenStore::with(vec![credential("x", 1)]));
        h.upstream.push_lookup(ready("abc123", "https://clips.example/abc123"));

        h.orchestrator.request_clip(request("x")).await.unwrap();
        assert_eq!(h.upstream.refreshes(), 1);
        assert_eq!(h.upstream.create_tokens(), vec!["at_refreshed_1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_error_during_poll_records_message_verbatim() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_lookup(pending("abc123"));
        h.upstream
            .push_lookup(Err(helix::Error::Http("connection reset".into())));

        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(helix::Error::Http(_))));

        let records = h.sink.records();
        assert_eq!(records[0].clip_id.as_deref(), Some("abc123"));
        assert_eq!(
            records[0].error.as_deref(),
            Some("HTTP request failed: connection reset")
        );

        // Only poll timeouts start the extended poll
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.upstream.lookups(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_clip_id_is_recorded_without_id() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Err(helix::Error::InvalidResponse(
            "Clip ID missing from Twitch response".into(),
        )));

        h.orchestrator.request_clip(request("x")).await.unwrap_err();
        let records = h.sink.records();
        assert!(records[0].clip_id.is_none());
        assert_eq!(
            records[0].error.as_deref(),
            Some("Clip ID missing from Twitch response")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_keeps_original_error() {
        let upstream = Arc::new(FakeUpstream::new());
        let store = Arc::new(MemoryTokenStore::default());
        let orchestrator = Orchestrator::new(
            Arc::new(CooldownGate::new()),
            CredentialManager::new(store, upstream.clone()),
            upstream,
            Arc::new(BrokenSink),
            AcquireSettings::default(),
        );

        let err = orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::NoCredential(_)), "got {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_credential_still_consumes_cooldown() {
        let h = harness(MemoryTokenStore::default());
        h.orchestrator.request_clip(request("x")).await.unwrap_err();

        let err = h.orchestrator.request_clip(request("x")).await.unwrap_err();
        assert!(matches!(err, Error::CooldownActive { .. }));
        assert_eq!(h.sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_still_records_outcome() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        for _ in 0..5 {
            h.upstream.push_lookup(pending("abc123"));
        }
        h.upstream.push_lookup(ready("abc123", "https://clips.example/abc123"));

        let gave_up = tokio::time::timeout(
            Duration::from_secs(10),
            h.orchestrator.request_clip(request("x")),
        )
        .await;
        assert!(gave_up.is_err());
        assert_eq!(h.sink.len(), 0);

        wait_for_records(&h.sink, 1).await;
        let records = h.sink.records();
        assert_eq!(records[0].status, ClipStatus::Ok);
        assert_eq!(records[0].url.as_deref(), Some("https://clips.example/abc123"));
        assert_eq!(h.upstream.creates(), 1);
        assert_eq!(h.upstream.lookups(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_still_hands_off_to_extended_poll() {
        let h = harness(MemoryTokenStore::with(vec![fresh_credential("x")]));
        h.upstream.push_create(Ok(CreatedClip {
            clip_id: "xyz".into(),
        }));
        for _ in 0..12 {
            h.upstream.push_lookup(pending("xyz"));
        }
        h.upstream.push_lookup(ready("xyz", "https://clips.example/xyz"));

        let gave_up = tokio::time::timeout(
            Duration::from_secs(5),
            h.orchestrator.request_clip(request("x")),
        )
        .await;
        assert!(gave_up.is_err());

        wait_for_records(&h.sink, 2).await;
        let records = h.sink.records();
        assert_eq!(records[0].status, ClipStatus::Failed);
        assert_eq!(records[0].clip_id.as_deref(), Some("xyz"));
        assert_eq!(records[1].status, ClipStatus::Ok);
        assert_eq!(records[1].url.as_deref(), Some("https://clips.example/xyz"));
        assert_eq!(h.upstream.lookups(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn accounts_poll_concurrently() {
        let h = harness(MemoryTokenStore::with(vec![
            fresh_credential("a"),
            fresh_credential("b"),
        ]));
        h.upstream.push_lookup(pending("abc123"));
        h.upstream.push_lookup(pending("abc123"));
        h.upstream.push_lookup(ready("abc123", "https://clips.example/1"));
        h.upstream.push_lookup(ready("abc123", "https://clips.example/2"));

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            h.orchestrator.request_clip(request("a")),
            h.orchestrator.request_clip(request("b")),
        );
        a.unwrap();
        b.unwrap();

        // One poll delay in total, not one per account
        assert_eq!(start.elapsed(), Duration::from_millis(2_500));
        assert_eq!(h.upstream.lookups(), 4);
        assert_eq!(h.sink.len(), 2);
    }

    #[test]
    fn default_settings_match_documented_budgets() {
        let s = AcquireSettings::default();
        assert_eq!(s.cooldown, Duration::from_secs(30));
        assert_eq!(s.foreground.attempts, 12);
        assert_eq!(s.foreground.delay, Duration::from_millis(2_500));
        assert_eq!(s.extended.attempts, 10);
        assert_eq!(s.extended.delay, Duration::from_secs(15));
    }
}
