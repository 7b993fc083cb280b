//! Failure classification and alert throttling.
//!
//! Every failed tick passes through [`handle_failure`]. Counters accumulate
//! over an error window (the span between two successful ticks) and decide
//! whether operators hear about it:
//!
//! - Server errors (500/503) and transport errors alert once, on the 5th
//!   occurrence.
//! - Everything else alerts on each of the first four occurrences, sends a
//!   stop notice on the 5th, and goes silent afterwards.

use tracing::{error, warn};

use crate::error::RelayError;
use crate::relay::ChatSink;

/// Occurrence count at which a category alerts (or stops alerting).
const THRESHOLD: u32 = 5;

const STOP_NOTICE: &str = "Reporting further errors stopped.";

/// Per-window failure counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorState {
    pub platform_server_errors: u32,
    pub platform_request_errors: u32,
    pub chat_server_errors: u32,
    pub other_errors: u32,
}

impl ErrorState {
    /// Closes the current error window.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Counts `failure` and decides what, if anything, to tell operators.
    pub fn record(&mut self, failure: Failure) -> Verdict {
        match failure {
            Failure::PlatformServer => {
                self.platform_server_errors += 1;
                threshold_verdict(
                    self.platform_server_errors,
                    "Warning: frequent Reddit server errors.",
                    true,
                )
            }
            Failure::PlatformRequest => {
                self.platform_request_errors += 1;
                threshold_verdict(
                    self.platform_request_errors,
                    "Warning: frequent Reddit request errors.",
                    false,
                )
            }
            Failure::ChatServer => {
                self.chat_server_errors += 1;
                threshold_verdict(
                    self.chat_server_errors,
                    "Warning: frequent Discord server errors.",
                    true,
                )
            }
            Failure::PlatformOther(status) => {
                self.other_errors += 1;
                taper_verdict(self.other_errors, || format!("Reddit error {status}."))
            }
            Failure::ChatOther(status) => {
                self.other_errors += 1;
                taper_verdict(self.other_errors, || format!("Discord error {status}."))
            }
            Failure::Unknown => {
                self.other_errors += 1;
                taper_verdict(self.other_errors, || "Unknown error.".to_string())
            }
        }
    }
}

/// Category a failure is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    PlatformServer,
    PlatformOther(u16),
    PlatformRequest,
    ChatServer,
    ChatOther(u16),
    Unknown,
}

impl Failure {
    pub fn classify(err: &RelayError) -> Self {
        match err {
            RelayError::RedditStatus { status } if is_server_status(*status) => {
                Self::PlatformServer
            }
            RelayError::RedditStatus { status } => Self::PlatformOther(*status),
            RelayError::RedditRequest(_) => Self::PlatformRequest,
            RelayError::DiscordStatus { status } if is_server_status(*status) => Self::ChatServer,
            RelayError::DiscordStatus { status } => Self::ChatOther(*status),
            RelayError::RedditDecode(_)
            | RelayError::DiscordRequest(_)
            | RelayError::DiscordDecode(_)
            | RelayError::Auth(_)
            | RelayError::Store(_) => Self::Unknown,
        }
    }
}

fn is_server_status(status: u16) -> bool {
    matches!(status, 500 | 503)
}

/// What to do about one recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Meta-alert text to send to the chat channel.
    pub alert: Option<String>,
    /// Whether the failure itself should be logged.
    pub log_detail: bool,
}

impl Verdict {
    const SILENT: Self = Self {
        alert: None,
        log_detail: false,
    };
}

fn threshold_verdict(count: u32, text: &str, log_detail: bool) -> Verdict {
    if count == THRESHOLD {
        Verdict {
            alert: Some(text.to_string()),
            log_detail,
        }
    } else {
        Verdict::SILENT
    }
}

fn taper_verdict(count: u32, text: impl FnOnce() -> String) -> Verdict {
    match count.cmp(&THRESHOLD) {
        std::cmp::Ordering::Less => Verdict {
            alert: Some(text()),
            log_detail: true,
        },
        std::cmp::Ordering::Equal => Verdict {
            alert: Some(STOP_NOTICE.to_string()),
            log_detail: false,
        },
        std::cmp::Ordering::Greater => Verdict::SILENT,
    }
}

/// Records a failed tick and sends whatever alert it warrants.
///
/// Never fails: alert delivery problems are logged and dropped.
pub fn handle_failure(err: &RelayError, state: &mut ErrorState, chat: &dyn ChatSink) {
    let verdict = state.record(Failure::classify(err));
    if verdict.log_detail {
        error!(error = %err, "tick failed");
    }
    if let Some(text) = verdict.alert {
        try_send_alert(chat, &text);
    }
}

/// Sends a meta-alert, logging instead of propagating delivery failures.
pub fn try_send_alert(chat: &dyn ChatSink, text: &str) {
    warn!(alert = text, "sending alert");
    if let Err(e) = chat.send_text(text) {
        error!(error = %e, alert = text, "failed to deliver alert to Discord");
    }
}
