//! Detached extended poll
//!
//! Started when the foreground poll gives up on a clip that was created. The
//! task is spawned and never joined: it outlives the request that started it
//! and runs until a URL appears or its attempt budget is spent. Nothing it
//! does is reported back to the original caller; its only visible effect is a
//! later `ok` record. Tasks still running at process exit are lost.

use std::sync::Arc;

use helix::{ClipInfo, Upstream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::CredentialManager;
use crate::orchestrator::PollPolicy;
use crate::outcome::{Clip, ClipOutcome, ClipRequest};
use crate::sink::ClipSink;

/// Spawn a background poll for `clip_id`.
///
/// Each attempt waits `policy.delay`, re-ensures the account credential (it
/// may have expired since the request began) and looks the clip up. Errors
/// are logged and the next attempt proceeds.
pub fn spawn_extended_poll(
    credentials: CredentialManager,
    upstream: Arc<dyn Upstream>,
    sink: Arc<dyn ClipSink>,
    request: ClipRequest,
    clip_id: String,
    policy: PollPolicy,
) -> JoinHandle<()> {
    metrics::counter!("clip_extended_polls_total", "outcome" => "started").increment(1);
    info!(
        account_id = %request.account_id,
        clip_id = %clip_id,
        attempts = policy.attempts,
        delay_ms = policy.delay.as_millis() as u64,
        "starting extended clip poll"
    );

    tokio::spawn(async move {
        extended_poll(&credentials, upstream.as_ref(), sink.as_ref(), &request, &clip_id, policy)
            .await;
    })
}

async fn extended_poll(
    credentials: &CredentialManager,
    upstream: &dyn Upstream,
    sink: &dyn ClipSink,
    request: &ClipRequest,
    clip_id: &str,
    policy: PollPolicy,
) {
    let account_id = request.account_id.as_str();

    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.delay).await;

        let credential = match credentials.ensure(account_id).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(account_id, clip_id, attempt, error = %e, "extended poll could not obtain credential");
                continue;
            }
        };

        let lookup = upstream
            .get_clip(credential.access_token.expose(), clip_id)
            .await;
        match lookup {
            Ok(ClipInfo { url: Some(url), .. }) => {
                let clip = Clip {
                    clip_id: clip_id.to_string(),
                    url,
                };
                if let Err(e) = sink
                    .save_clip(ClipOutcome::pending(request).succeeded(&clip))
                    .await
                {
                    warn!(account_id, clip_id, error = %e, "failed to record recovered clip");
                }
                metrics::counter!("clip_extended_polls_total", "outcome" => "recovered")
                    .increment(1);
                info!(account_id, clip_id, attempt, url = %clip.url, "extended poll recovered clip");
                return;
            }
            Ok(_) => debug!(account_id, clip_id, attempt, "clip still processing"),
            Err(e) => debug!(account_id, clip_id, attempt, error = %e, "extended poll lookup failed"),
        }
    }

    metrics::counter!("clip_extended_polls_total", "outcome" => "exhausted").increment(1);
    debug!(account_id, clip_id, "extended poll exhausted");
}
