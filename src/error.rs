//! Failures a relay tick can surface.

use crate::store::StoreError;

/// Anything that can abort a tick.
///
/// Variants mirror where the failure came from so the alert throttle can
/// classify it without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("reddit responded with status {status}")]
    RedditStatus { status: u16 },

    #[error("reddit request failed: {0}")]
    RedditRequest(String),

    #[error("malformed reddit response: {0}")]
    RedditDecode(String),

    #[error("discord responded with status {status}")]
    DiscordStatus { status: u16 },

    #[error("discord request failed: {0}")]
    DiscordRequest(String),

    #[error("malformed discord response: {0}")]
    DiscordDecode(String),

    #[error("reddit authorization failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = core::result::Result<T, RelayError>;
