//! Outcome persistence seam

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::outcome::ClipOutcome;

/// Append-only destination for clip outcomes.
///
/// Every call is an independent append. Implementations must never update or
/// merge an earlier record, even when the clip id matches.
pub trait ClipSink: Send + Sync {
    fn save_clip(&self, outcome: ClipOutcome) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
