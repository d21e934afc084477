use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Fire-and-forget user-facing message sink. Messages are full sentences in
/// Brazilian Portuguese; no structured error codes cross this boundary.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// Collects notices so a caller can hand them back to the client once the
/// operation settles.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|mut notices| std::mem::take(&mut *notices))
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(Notice {
                kind: NoticeKind::Success,
                text: message.to_string(),
            });
        }
    }

    fn error(&self, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(Notice {
                kind: NoticeKind::Error,
                text: message.to_string(),
            });
        }
    }
}
