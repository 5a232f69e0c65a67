//! Upstream error classification

/// Errors from a single Helix or token-endpoint call.
///
/// `Status` carries any non-2xx answer verbatim. Transport failures and
/// unparseable bodies are kept apart so callers can log them distinctly,
/// but none of them is retried here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Twitch API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{0}")]
    InvalidResponse(String),
}

impl Error {
    /// HTTP status of a rejected call, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A 401 means the bearer token is invalid or expired.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<twitch_auth::Error> for Error {
    fn from(err: twitch_auth::Error) -> Self {
        match err {
            twitch_auth::Error::Rejected { status, body } => Error::Status { status, body },
            twitch_auth::Error::Http(msg) => Error::Http(msg),
            other => Error::InvalidResponse(other.to_string()),
        }
    }
}

/// Result alias for upstream calls.
pub type Result<T> = std::result::Result<T, Error>;
