//! Operator-visible warnings.
//!
//! Warnings are what a person watching the status page sees. They are
//! separate from log lines: a dropped frame is logged every time, but the
//! operator only gets one "repeated slow frames" warning per cooldown.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    message: String,
    expires: Option<Instant>,
}

/// Shared list of active warnings. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct WarningHolder {
    entries: Arc<Mutex<Vec<Entry>>>,
}

/// A warning as reported to the status API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Warning {
    pub message: String,
    /// Seconds until the warning clears itself, if it is timed.
    pub expires_in_secs: Option<u64>,
}

impl WarningHolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        // A poisoned lock only means another thread panicked mid-push;
        // the list itself is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a warning that stays for the life of the process.
    /// Duplicate messages are ignored.
    pub fn add_warning(&self, message: impl Into<String>) {
        let message = message.into();
        let mut entries = self.lock();
        if entries.iter().any(|e| e.message == message) {
            return;
        }
        entries.push(Entry {
            message,
            expires: None,
        });
    }

    /// Add a warning that clears itself after `timeout`.
    ///
    /// Returns `false` if the same message is still live, in which case
    /// the existing entry is kept as-is.
    pub fn add_warning_timeout(&self, message: impl Into<String>, timeout: Duration) -> bool {
        let message = message.into();
        let now = Instant::now();
        let mut entries = self.lock();
        prune(&mut entries, now);

        if entries.iter().any(|e| e.message == message) {
            return false;
        }
        entries.push(Entry {
            message,
            expires: Some(now + timeout),
        });
        true
    }

    /// Currently active warnings, oldest first.
    pub fn active(&self) -> Vec<Warning> {
        let now = Instant::now();
        let mut entries = self.lock();
        prune(&mut entries, now);

        entries
            .iter()
            .map(|e| Warning {
                message: e.message.clone(),
                expires_in_secs: e
                    .expires
                    .map(|at| at.saturating_duration_since(now).as_secs()),
            })
            .collect()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.active().iter().any(|w| w.message == message)
    }
}

fn prune(entries: &mut Vec<Entry>, now: Instant) {
    entries.retain(|e| e.expires.is_none_or(|at| at > now));
}
