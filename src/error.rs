use thiserror::Error;

/// Failures that callers are expected to tell apart.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("discovery failed for {filter}: {reason}")]
    Discovery { filter: String, reason: String },

    #[error("timed out waiting for `{selector}` on {url} after {attempts} attempt(s)")]
    CaptureTimeout {
        url: String,
        selector: String,
        attempts: u32,
    },

    #[error("render failed for {url}: {reason}")]
    Render { url: String, reason: String },
}

impl Error {
    pub fn render(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Render {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn auth(reason: impl std::fmt::Display) -> Self {
        Self::Auth {
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
