//! JSON-lines clip history
//!
//! Each outcome becomes one line appended to the file, stamped with
//! `recorded_at` (unix millis). Lines are never rewritten, so a `failed`
//! record and a later recovered `ok` record for the same clip both stay.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use clip_acquire::{ClipOutcome, ClipSink};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Serialize)]
struct Line<'a> {
    #[serde(flatten)]
    outcome: &'a ClipOutcome,
    recorded_at: u64,
}

/// Append-only clip outcome file.
pub struct JsonlClipSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlClipSink {
    /// Open (creating if needed) the history file at `path`.
    pub async fn open(path: PathBuf) -> std::io::Result<Self> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, outcome: ClipOutcome) -> clip_acquire::Result<()> {
        let line = Line {
            outcome: &outcome,
            recorded_at: twitch_auth::now_millis(),
        };
        let mut json = serde_json::to_string(&line)
            .map_err(|e| clip_acquire::Error::Sink(format!("serializing clip outcome: {e}")))?;
        json.push('\n');

        // Keeps concurrent appends from interleaving
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| clip_acquire::Error::Sink(format!("opening clip history: {e}")))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| clip_acquire::Error::Sink(format!("writing clip history: {e}")))?;
        file.flush()
            .await
            .map_err(|e| clip_acquire::Error::Sink(format!("flushing clip history: {e}")))?;

        debug!(
            account_id = %outcome.account_id,
            status = ?outcome.status,
            "clip outcome recorded"
        );
        Ok(())
    }
}

impl ClipSink for JsonlClipSink {
    fn save_clip(
        &self,
        outcome: ClipOutcome,
    ) -> Pin<Box<dyn Future<Output = clip_acquire::Result<()>> + Send + '_>> {
        Box::pin(self.append(outcome))
    }
}

/// Parse every line of a history file (test helper).
#[cfg(test)]
pub(crate) async fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    let contents = tokio::fs::read_to_string(path).await.unwrap();
    contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
