// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use quotient_db::Database;
use tokio::sync::Notify;

use crate::admission::AdmissionController;
use crate::dispatch::Dispatcher;
use crate::notify::Notifier;
use crate::tier_provider::TierProvider;
use crate::tracker::StatusTracker;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job store handle.
    pub db: Database,
    /// Admission controller (validation, tier quota, queued insert).
    pub admission: AdmissionController,
    /// Single authority over job lifecycle mutations.
    pub tracker: Arc<StatusTracker>,
    /// Backend routing registry.
    pub dispatcher: Arc<Dispatcher>,
    /// Wakes the scheduler loop early after an admission.
    pub scheduler_nudge: Arc<Notify>,
}

impl AppState {
    /// Wire up the application state from its collaborators.
    pub fn new(
        db: Database,
        tiers: Arc<dyn TierProvider>,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let scheduler_nudge = Arc::new(Notify::new());
        let tracker = Arc::new(StatusTracker::new(db.clone(), dispatcher.clone(), notifier));
        let admission =
            AdmissionController::new(db.clone(), tiers, scheduler_nudge.clone());
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            admission,
            tracker,
            dispatcher,
            scheduler_nudge,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::tier_provider::StaticTierProvider;

    async fn test_state() -> Arc<AppState> {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        AppState::new(
            db,
            Arc::new(StaticTierProvider::all_default("basic")),
            Arc::new(Dispatcher::in_process_defaults()),
            Arc::new(LogNotifier),
        )
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = test_state().await;
        assert!(state.uptime_secs() < 1);
    }

    #[tokio::test]
    async fn test_app_state_shares_one_nudge() {
        let state = test_state().await;
        // The nudge handed to admission is the same one the scheduler waits
        // on; notify before waiting must wake the waiter.
        let nudge = state.scheduler_nudge.clone();
        nudge.notify_one();
        tokio::time::timeout(std::time::Duration::from_millis(100), nudge.notified())
            .await
            .expect("nudge should already be pending");
    }
}
