//! The ordered, append-only message history of one session.
//!
//! Newest-first: reconciliation and local echo both prepend, nothing ever
//! reorders previously inserted entries. The log lives and dies with its
//! session; there is no cross-session persistence.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use pager_shared::types::{Message, MessageOrigin};

/// Shared handle to the session's message log.
///
/// All mutation is a prepend under one mutex, which is the entire
/// concurrency story: the reconciler and the dispatcher's echo path can
/// append from any task without corrupting order.
#[derive(Clone, Default)]
pub struct MessageLog {
    entries: Arc<Mutex<Vec<Message>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a message so it becomes the newest entry.
    pub fn prepend(&self, message: Message) {
        let mut entries = self.lock();
        entries.insert(0, message);
    }

    /// Snapshot of the log, newest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Mark a message read. Returns false if the id is unknown.
    pub fn mark_read(&self, id: Uuid) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.read = true;
                true
            }
            None => false,
        }
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|m| !m.read).count()
    }

    pub fn inbound_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|m| m.origin == MessageOrigin::Inbound)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        // A panic while holding the lock is a bug in this module; the lock
        // guards nothing that can half-update.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            from: "alice".to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
            read: false,
            origin: MessageOrigin::Inbound,
        }
    }

    #[test]
    fn test_prepend_is_newest_first() {
        let log = MessageLog::new();
        log.prepend(message("first"));
        log.prepend(message("second"));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].body, "second");
        assert_eq!(snapshot[1].body, "first");
    }

    #[test]
    fn test_mark_read() {
        let log = MessageLog::new();
        let m = message("hello");
        let id = m.id;
        log.prepend(m);

        assert_eq!(log.unread_count(), 1);
        assert!(log.mark_read(id));
        assert_eq!(log.unread_count(), 0);
        assert!(!log.mark_read(Uuid::new_v4()));
    }
}
