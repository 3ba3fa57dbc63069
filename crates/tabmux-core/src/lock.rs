//! Per-session FIFO mutex.
//!
//! One `tokio::sync::Mutex<()>` per session id, created on first use and
//! dropped from the table once nobody holds or waits for it. Tokio's mutex
//! queues waiters in arrival order, which gives FIFO fairness per session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
pub struct SessionLocks {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`. Never fails and never times out.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let slot = {
            let mut slots = lock_table(&self.slots);
            Arc::clone(slots.entry(session_id.to_string()).or_default())
        };
        let guard = slot.lock_owned().await;
        SessionGuard {
            session_id: session_id.to_string(),
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of sessions with a live wait chain.
    pub fn len(&self) -> usize {
        lock_table(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_table(
    slots: &Mutex<HashMap<String, Slot>>,
) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
    // The table is only mutated by short, non-panicking sections.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive hold on one session. Released on drop, on every exit path.
#[derive(Debug)]
pub struct SessionGuard {
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut slots = lock_table(&self.slots);
        // Release while holding the table so a concurrent `acquire` cannot
        // clone the slot between the release and the count check.
        self.guard.take();
        if let Some(slot) = slots.get(&self.session_id) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.session_id);
            }
        }
    }
}
