//! Error types for clip acquisition

/// Failures of a clip request.
///
/// `CooldownActive` is an expected gate rejection rather than a failure: no
/// outcome record is written for it. Every other variant ends the request with
/// a `failed` record whose `error` field is this value's `Display` text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Clip is on cooldown. Try again in {remaining_secs}s.")]
    CooldownActive { remaining_secs: u64 },

    #[error("No tokens found for broadcaster {0}")]
    NoCredential(String),

    #[error(transparent)]
    Upstream(#[from] helix::Error),

    #[error("Refresh token failed {status}: {body}")]
    RefreshFailed { status: u16, body: String },

    #[error("Clip URL unavailable after polling")]
    PollTimeout { clip_id: String },

    #[error("credential store error: {0}")]
    Store(String),

    #[error("clip sink error: {0}")]
    Sink(String),

    #[error("clip request task ended abnormally: {0}")]
    Aborted(String),
}

impl Error {
    /// Stable label for metrics and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::CooldownActive { .. } => "cooldown_active",
            Error::NoCredential(_) => "no_credential",
            Error::Upstream(_) => "upstream_error",
            Error::RefreshFailed { .. } => "refresh_failed",
            Error::PollTimeout { .. } => "poll_timeout",
            Error::Store(_) => "store_error",
            Error::Sink(_) => "sink_error",
            Error::Aborted(_) => "aborted",
        }
    }
}

impl From<twitch_auth::Error> for Error {
    fn from(err: twitch_auth::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result alias for clip acquisition.
pub type Result<T> = std::result::Result<T, Error>;
