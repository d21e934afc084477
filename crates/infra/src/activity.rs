use serde::Serialize;
use surrealdb::engine::remote::ws::Client;
use surrealdb::Surreal;

use enquete_domain::ports::activity::{ActivityEntry, ActivityLevel, ActivityLogger};
use enquete_domain::util::{format_ms_rfc3339, now_ms, uuid_v7_without_dashes};

/// Routes activity entries into the tracing pipeline.
pub struct TracingActivityLogger;

impl ActivityLogger for TracingActivityLogger {
    fn log(&self, entry: ActivityEntry) {
        match entry.level {
            ActivityLevel::Info => tracing::info!(
                category = entry.category,
                actor_id = entry.actor_id.as_deref(),
                actor_email = entry.actor_email.as_deref(),
                company_id = entry.company_id.as_deref(),
                "{}",
                entry.message
            ),
            ActivityLevel::Warn => tracing::warn!(
                category = entry.category,
                actor_id = entry.actor_id.as_deref(),
                actor_email = entry.actor_email.as_deref(),
                company_id = entry.company_id.as_deref(),
                "{}",
                entry.message
            ),
            ActivityLevel::Error => tracing::error!(
                category = entry.category,
                actor_id = entry.actor_id.as_deref(),
                actor_email = entry.actor_email.as_deref(),
                company_id = entry.company_id.as_deref(),
                "{}",
                entry.message
            ),
        }
    }
}

#[derive(Serialize)]
struct ActivityRow {
    activity_id: String,
    level: &'static str,
    message: String,
    category: String,
    actor_id: Option<String>,
    actor_email: Option<String>,
    company_id: Option<String>,
    logged_at: String,
}

/// Persists activity entries into the `activity_log` table. Writes are
/// fire-and-forget: a failed insert is traced and dropped, never surfaced.
pub struct SurrealActivityLogger {
    db: Surreal<Client>,
}

impl SurrealActivityLogger {
    pub fn new(db: Surreal<Client>) -> Self {
        Self { db }
    }
}

impl ActivityLogger for SurrealActivityLogger {
    fn log(&self, entry: ActivityEntry) {
        TracingActivityLogger.log(entry.clone());

        let db = self.db.clone();
        let row = ActivityRow {
            activity_id: uuid_v7_without_dashes(),
            level: entry.level.as_str(),
            message: entry.message,
            category: entry.category,
            actor_id: entry.actor_id,
            actor_email: entry.actor_email,
            company_id: entry.company_id,
            logged_at: format_ms_rfc3339(now_ms()),
        };
        tokio::spawn(async move {
            let created: Result<Option<serde_json::Value>, surrealdb::Error> =
                db.create("activity_log").content(row).await;
            if let Err(err) = created {
                tracing::warn!(error = %err, "activity log insert failed");
            }
        });
    }
}
