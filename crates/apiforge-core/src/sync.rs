//! Sync coordination: at most one running sync per key.
//!
//! Each key moves through `Idle → Running → Done`, or `Running → TimedOut`
//! when a run outlives the ceiling. A timed-out run no longer blocks new
//! ones. Starting a run yields a [`SyncGuard`]; dropping it completes the run
//! unless a newer run has taken over the key. There is no waiter queue: a
//! rejected caller retries on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};

/// Key used for a sync of every source.
pub const ALL_SOURCES_KEY: &str = "all";

/// Errors raised by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A run for the key is still in progress.
    #[error("sync already in progress for '{key}'")]
    AlreadyInProgress {
        /// The contested key.
        key: String,
    },
}

/// State of one sync key. Times are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncState {
    /// Never run.
    Idle,
    /// A run holds the key.
    #[serde(rename_all = "camelCase")]
    Running {
        /// Run identifier.
        run_id: Uuid,
        /// Start time.
        started_at: i64,
    },
    /// The last run finished.
    #[serde(rename_all = "camelCase")]
    Done {
        /// Run identifier.
        run_id: Uuid,
        /// Completion time.
        finished_at: i64,
    },
    /// The last run exceeded the ceiling and was abandoned.
    #[serde(rename_all = "camelCase")]
    TimedOut {
        /// Run identifier.
        run_id: Uuid,
        /// Start time.
        started_at: i64,
    },
}

struct Inner {
    states: Mutex<HashMap<String, SyncState>>,
    timeout_ms: i64,
    clock: Arc<dyn Clock>,
}

/// Per-key mutual exclusion for sync runs.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("timeout_ms", &self.inner.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Coordinator on the system clock.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    /// Coordinator with an injected clock.
    #[must_use]
    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                states: Mutex::new(HashMap::new()),
                timeout_ms: i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX),
                clock,
            }),
        }
    }

    /// Start a run for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyInProgress`] if a run for the key started
    /// less than the ceiling ago.
    pub fn begin(&self, key: &str) -> Result<SyncGuard, SyncError> {
        let now = self.inner.clock.now_ms();
        let mut states = self.inner.states.lock();

        if let Some(SyncState::Running { run_id, started_at }) = states.get(key).copied() {
            if now.saturating_sub(started_at) < self.inner.timeout_ms {
                return Err(SyncError::AlreadyInProgress {
                    key: key.to_string(),
                });
            }
            tracing::warn!(key, %run_id, "Previous sync exceeded its time limit, starting over");
        }

        let run_id = Uuid::new_v4();
        states.insert(
            key.to_string(),
            SyncState::Running {
                run_id,
                started_at: now,
            },
        );
        tracing::debug!(key, %run_id, "Sync started");

        Ok(SyncGuard {
            coordinator: self.clone(),
            key: key.to_string(),
            run_id,
        })
    }

    /// Current state of `key`. An expired run is reported, and recorded, as
    /// timed out.
    #[must_use]
    pub fn state(&self, key: &str) -> SyncState {
        let now = self.inner.clock.now_ms();
        let mut states = self.inner.states.lock();

        match states.get(key).copied() {
            None => SyncState::Idle,
            Some(SyncState::Running { run_id, started_at })
                if now.saturating_sub(started_at) >= self.inner.timeout_ms =>
            {
                let timed_out = SyncState::TimedOut { run_id, started_at };
                states.insert(key.to_string(), timed_out);
                timed_out
            }
            Some(state) => state,
        }
    }

    /// Whether a live run holds `key`.
    #[must_use]
    pub fn is_running(&self, key: &str) -> bool {
        matches!(self.state(key), SyncState::Running { .. })
    }

    fn finish(&self, key: &str, run_id: Uuid) {
        let now = self.inner.clock.now_ms();
        let mut states = self.inner.states.lock();

        match states.get(key).copied() {
            Some(SyncState::Running { run_id: current, .. }) if current == run_id => {
                states.insert(
                    key.to_string(),
                    SyncState::Done {
                        run_id,
                        finished_at: now,
                    },
                );
                tracing::debug!(key, %run_id, "Sync finished");
            }
            _ => tracing::debug!(key, %run_id, "Sync finished after being superseded"),
        }
    }
}

/// Ownership of a running sync. Completes the run on drop.
#[derive(Debug)]
#[must_use = "dropping the guard ends the sync immediately"]
pub struct SyncGuard {
    coordinator: SyncCoordinator,
    key: String,
    run_id: Uuid,
}

impl SyncGuard {
    /// Key this run holds.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.coordinator.finish(&self.key, self.run_id);
    }
}
