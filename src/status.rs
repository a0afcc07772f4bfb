use chrono::{DateTime, Utc};
use serde::Serialize;

/// Success and info banners are hidden by the client after this long.
pub const DISMISS_AFTER_MS: u64 = 5000;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Info,
    Error,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    /// `None` keeps the message on screen until it is replaced.
    pub dismiss_after_ms: Option<u64>,
    pub posted_at: DateTime<Utc>,
}

impl StatusMessage {
    fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        let dismiss_after_ms = match kind {
            StatusKind::Success | StatusKind::Info => Some(DISMISS_AFTER_MS),
            StatusKind::Error => None,
        };
        Self {
            kind,
            text: text.into(),
            dismiss_after_ms,
            posted_at: Utc::now(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Info, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, text)
    }
}
