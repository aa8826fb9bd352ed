use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{Actor, Application, ApplicationStatus, Stage, StageHistoryEntry};

/// Wall-clock source, injectable so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Builds stage history entries. Never appends or persists anything itself.
#[derive(Clone)]
pub struct AuditRecorder {
    clock: Arc<dyn Clock>,
}

impl Default for AuditRecorder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AuditRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Entry for `(stage, status)` stamped no earlier than the application's last entry.
    pub fn record(
        &self,
        application: &Application,
        stage: Stage,
        status: ApplicationStatus,
        actor: &Actor,
        reason: Option<&str>,
    ) -> StageHistoryEntry {
        let now = self.clock.now();
        let timestamp = match application.last_recorded_at() {
            Some(last) if last > now => {
                debug!(
                    application_id = %application.id,
                    %last,
                    %now,
                    "clock behind last history entry; clamping timestamp"
                );
                last
            }
            _ => now,
        };

        StageHistoryEntry {
            stage,
            status,
            timestamp,
            actor: actor.role(),
            actor_id: actor.id().to_string(),
            reason: reason.map(str::to_string),
        }
    }
}
