use serde::{Deserialize, Serialize};

use crate::identity::Viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Info,
    Warn,
    Error,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Info => "info",
            ActivityLevel::Warn => "warn",
            ActivityLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub level: ActivityLevel,
    pub message: String,
    pub category: String,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub company_id: Option<String>,
}

impl ActivityEntry {
    pub fn new(level: ActivityLevel, message: impl Into<String>, category: &str) -> Self {
        Self {
            level,
            message: message.into(),
            category: category.to_string(),
            actor_id: None,
            actor_email: None,
            company_id: None,
        }
    }

    pub fn with_actor(mut self, viewer: &Viewer) -> Self {
        self.actor_id = Some(viewer.user_id.clone());
        self.actor_email = Some(viewer.email.clone());
        self.company_id = viewer.company_id.clone();
        self
    }
}

/// Fire-and-forget activity sink. Implementations must never block or fail
/// the caller; delivery errors are their own problem to swallow.
pub trait ActivityLogger: Send + Sync {
    fn log(&self, entry: ActivityEntry);
}
