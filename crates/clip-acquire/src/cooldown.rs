//! Per-account cooldown gate
//!
//! One entry per account holding the instant its current window ends. The
//! check and the grant happen under one lock acquisition, so two concurrent
//! requests for the same account can never both be granted. Expired entries
//! are pruned lazily on the next grant; an absent entry means available.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// In-memory, process-lifetime cooldown state.
#[derive(Debug, Default)]
pub struct CooldownGate {
    windows: Mutex<HashMap<String, Instant>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a new window of `window` starting now if the previous one has
    /// ended. Returns false, leaving state untouched, while a window is active.
    pub async fn try_acquire(&self, account_id: &str, window: Duration) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, until| *until > now);

        if windows.contains_key(account_id) {
            return false;
        }

        windows.insert(account_id.to_string(), now + window);
        debug!(account_id, window_secs = window.as_secs(), "cooldown granted");
        true
    }

    /// Whole seconds left in the account's window, rounded up. Zero when no
    /// window is active.
    pub async fn remaining(&self, account_id: &str) -> u64 {
        let now = Instant::now();
        let windows = self.windows.lock().await;
        match windows.get(account_id) {
            Some(until) if *until > now => ceil_secs(*until - now),
            _ => 0,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
