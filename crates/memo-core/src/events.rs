//! Local data-change notifications.
//!
//! Every local mutation path emits a [`DataPart`] through a shared
//! [`ChangeFeed`]. The sync scheduler is the only intended consumer; emitters
//! never know who is listening.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Which part of the local snapshot changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataPart {
    /// Main notes list
    Notes,
    /// Pinned overlay
    Pinned,
    /// Tombstone list
    Deletions,
    /// A settings blob, identified by its store key
    Settings(&'static str),
}

impl fmt::Display for DataPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notes => f.write_str("notes"),
            Self::Pinned => f.write_str("pinned"),
            Self::Deletions => f.write_str("deletions"),
            Self::Settings(key) => f.write_str(key),
        }
    }
}

type Callback = Arc<dyn Fn(DataPart) + Send + Sync>;

/// Handle that unsubscribes when dropped.
pub struct Subscription {
    feed: Weak<ChangeFeed>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.unsubscribe(self.id);
        }
    }
}

/// Process-wide data-change notifier.
#[derive(Default)]
pub struct ChangeFeed {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl ChangeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` for every change until the subscription is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(DataPart) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription {
            feed: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run while emit holds the read lock during unwinding.
        if let Ok(mut callbacks) = self.callbacks.try_write() {
            callbacks.retain(|(callback_id, _)| *callback_id != id);
        }
    }

    /// Notify all subscribers that `part` changed.
    pub fn emit(&self, part: DataPart) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        tracing::trace!("Data changed: {}", part);
        for callback in callbacks {
            callback(part);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn subscribers_receive_parts_until_dropped() {
        let feed = ChangeFeed::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = feed.subscribe(move |part| sink.lock().unwrap().push(part));

        feed.emit(DataPart::Notes);
        feed.emit(DataPart::Settings("settings.font"));
        assert_eq!(feed.subscriber_count(), 1);

        drop(subscription);
        feed.emit(DataPart::Pinned);

        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![DataPart::Notes, DataPart::Settings("settings.font")]
        );
    }

    #[test]
    fn display_uses_store_key_for_settings() {
        assert_eq!(DataPart::Settings("settings.theme").to_string(), "settings.theme");
        assert_eq!(DataPart::Deletions.to_string(), "deletions");
    }
}
