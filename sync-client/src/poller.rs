//! Periodic poller.
//!
//! One repeating timer per resource kind, each reporting the kind as
//! changed when it fires. The orchestrator turns that into a sync, exactly
//! as it does for a realtime notification.

use notesync_types::{AccountId, ResourceKind};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::config::PollingConfig;
use crate::scheduler::RepeatingTask;

/// Per-kind polling timers for one account.
#[derive(Debug)]
pub struct Poller {
    account: AccountId,
    config: PollingConfig,
    fast_mode: bool,
    changes: mpsc::UnboundedSender<ResourceKind>,
    tasks: HashMap<ResourceKind, RepeatingTask>,
}

impl Poller {
    /// Create a stopped poller.
    pub fn new(
        account: AccountId,
        config: PollingConfig,
        changes: mpsc::UnboundedSender<ResourceKind>,
    ) -> Self {
        Self {
            account,
            fast_mode: config.fast_mode,
            config,
            changes,
            tasks: HashMap::new(),
        }
    }

    /// Start a timer for every kind that has none. Idempotent.
    pub fn start(&mut self) {
        if !self.config.enabled {
            tracing::debug!(account = %self.account, "Polling disabled");
            return;
        }
        for kind in ResourceKind::ALL {
            if self.tasks.contains_key(&kind) {
                continue;
            }
            let period = self.config.period(kind, self.fast_mode);
            let changes = self.changes.clone();
            let account = self.account.clone();
            let task = RepeatingTask::spawn(period, move || {
                tracing::trace!(account = %account, "Poll tick: {}", kind);
                // A closed receiver means the account is shutting down.
                let _ = changes.send(kind);
            });
            self.tasks.insert(kind, task);
        }
        tracing::debug!(account = %self.account, "Polling started (fast: {})", self.fast_mode);
    }

    /// Cancel and clear every timer. Idempotent.
    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.values() {
            task.cancel();
        }
        self.tasks.clear();
        tracing::debug!(account = %self.account, "Polling stopped");
    }

    /// Switch between normal and fast periods, restarting running timers.
    pub fn set_fast_mode(&mut self, fast: bool) {
        if self.fast_mode == fast {
            return;
        }
        self.fast_mode = fast;
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    /// Whether any timer is running.
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Current period of the timer for `kind`, if running.
    pub fn period(&self, kind: ResourceKind) -> Option<std::time::Duration> {
        self.tasks.get(&kind).map(RepeatingTask::period)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
