//! Operator-facing notices raised by the calibration workflow.
//!
//! Notices are what the notification feed shows (transient "picture
//! requested", "calibration cancelled", warnings about missing markers).
//! They are separate from diagnostic `tracing` output.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    /// Get display string for the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "INFO",
            NoticeLevel::Success => "SUCCESS",
            NoticeLevel::Warning => "WARN",
            NoticeLevel::Error => "ERROR",
        }
    }

    /// Get emoji for the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "ℹ️",
            NoticeLevel::Success => "✅",
            NoticeLevel::Warning => "⚠️",
            NoticeLevel::Error => "❌",
        }
    }

    /// Whether the notice hides itself after a while.
    pub fn is_transient(&self) -> bool {
        !matches!(self, NoticeLevel::Error)
    }
}

/// A single notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub timestamp: DateTime<Local>,
    pub level: NoticeLevel,
    pub title: String,
    pub text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            title: title.into(),
            text: text.into(),
        }
    }

    pub fn info(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, text)
    }

    pub fn success(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title, text)
    }

    pub fn warning(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, title, text)
    }

    pub fn error(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, text)
    }

    /// Format the notice for display.
    pub fn format_display(&self) -> String {
        if self.text.is_empty() {
            format!(
                "[{}] {} {}",
                self.timestamp.format("%H:%M:%S"),
                self.level.emoji(),
                self.title
            )
        } else {
            format!(
                "[{}] {} {}: {}",
                self.timestamp.format("%H:%M:%S"),
                self.level.emoji(),
                self.title,
                self.text
            )
        }
    }
}
