//! Subscriber registry
//!
//! Deduplicated listener sets for command and transcript events. Dispatch
//! works on a snapshot, so listeners may register or unregister from inside
//! a callback without disturbing the delivery in progress.

use crate::commands::CommandEvent;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// Listener callback shared with the registry
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Who produced a line of the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// Display event: "what I heard" and "what I said"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEvent {
    pub speaker: Speaker,
    pub text: String,
    /// Interim recognizer hypotheses are `false`
    pub is_final: bool,
    pub timestamp: DateTime<Local>,
}

impl TranscriptEvent {
    pub fn user(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            is_final,
            timestamp: Local::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            is_final: true,
            timestamp: Local::now(),
        }
    }
}

pub type CommandRegistry = Registry<CommandEvent>;
pub type TranscriptRegistry = Registry<TranscriptEvent>;

/// Stable handle returned by [`Registry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Caller-owned membership in a registry.
///
/// Dropping it keeps the listener registered; call [`Subscription::unregister`]
/// to remove it.
pub struct Subscription {
    id: SubscriptionId,
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the listener from its registry
    pub fn unregister(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct Inner<T> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Callback<T>)>,
}

/// Set of listeners keyed by subscription handle
pub struct Registry<T> {
    name: &'static str,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

fn callback_addr<T>(callback: &Callback<T>) -> *const () {
    Arc::as_ptr(callback) as *const ()
}

impl<T: 'static> Registry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // Listeners never run under the lock
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a listener. Registering the same `Arc` again returns the
    /// existing handle instead of a duplicate entry.
    pub fn register(&self, callback: Callback<T>) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let existing = inner
                .entries
                .iter()
                .find(|(_, cb)| callback_addr(cb) == callback_addr(&callback))
                .map(|(id, _)| *id);

            match existing {
                Some(id) => {
                    debug!("{} listener already registered as #{}", self.name, id.0);
                    id
                }
                None => {
                    let id = SubscriptionId(inner.next_id);
                    inner.next_id += 1;
                    inner.entries.push((id, callback));
                    debug!(
                        "{} listener #{} registered ({} total)",
                        self.name,
                        id.0,
                        inner.entries.len()
                    );
                    id
                }
            }
        };

        let registry = self.clone();
        Subscription {
            id,
            remove: Some(Box::new(move || {
                registry.remove(id);
            })),
        }
    }

    /// Remove a listener by handle; returns whether it was present
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = inner.entries.len() != before;
        if removed {
            debug!("{} listener #{} unregistered", self.name, id.0);
        }
        removed
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.lock().entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Deliver an event to every current listener.
    ///
    /// A panicking listener is logged and skipped. Returns how many
    /// listeners completed normally.
    pub fn dispatch(&self, event: &T) -> usize {
        let snapshot: Vec<(SubscriptionId, Callback<T>)> = self.lock().entries.clone();
        let mut delivered = 0;

        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("❌ {} listener #{} panicked", self.name, id.0),
            }
        }

        delivered
    }
}
