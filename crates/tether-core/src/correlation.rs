//! Correlation and overflow table.
//!
//! Maps a correlation key either to one outstanding waiter or to a queue of
//! messages that arrived while nobody was waiting. Both maps live behind a
//! single mutex so that "is anyone waiting? then deliver, else buffer" is
//! one atomic step.
//!
//! ```text
//!  reader task ── dispatch(key, msg) ──▶ waiter registered? ── yes ──▶ Waiter::recv
//!                                                 │
//!                                                 └─ no ──▶ pending[key].push_back
//! ```
//!
//! Each key buffers at most [`MAX_PENDING_PER_KEY`] messages; later arrivals
//! are discarded since a drain could never return them. Buffers are only
//! released by [`CorrelationTable::drain_pending`], so the number of keys
//! grows with the number of distinct users seen.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{CorrelationError, CorrelationResult};

/// Size ceiling of one combined reply, in bytes.
pub const CONTENT_BUDGET: usize = 2047;

/// Line placed between a history entry and the reply that follows it.
pub const HISTORY_SEPARATOR: &str = "-----历史信息----";

/// Most messages a single drain can return: each one costs at least the
/// separator overhead.
pub const MAX_PENDING_PER_KEY: usize = CONTENT_BUDGET / HISTORY_SEPARATOR.len();

/// Serialized content length of a buffered message, in bytes.
pub trait ContentLength {
    /// Length of the message content once rendered to text.
    fn content_len(&self) -> usize;
}

/// Outcome of [`CorrelationTable::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the registered waiter.
    Delivered,
    /// Appended to the key's pending buffer.
    Buffered,
    /// The key's pending buffer was full; the message was dropped.
    Discarded,
}

struct Slot<M> {
    id: u64,
    tx: oneshot::Sender<M>,
}

struct Entries<M> {
    waiters: HashMap<String, Slot<M>>,
    pending: HashMap<String, VecDeque<M>>,
    next_id: u64,
}

/// Process-wide table shared by every connection's frame handler.
pub struct CorrelationTable<M> {
    entries: Mutex<Entries<M>>,
}

impl<M> Default for CorrelationTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> CorrelationTable<M> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                waiters: HashMap::new(),
                pending: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Registers a waiter for `key` without blocking.
    ///
    /// A waiter already registered for the same key is replaced; its
    /// [`Waiter::recv`] resolves with [`CorrelationError::Superseded`].
    pub fn register(&self, key: impl Into<String>) -> Waiter<'_, M> {
        let key = key.into();
        let (tx, rx) = oneshot::channel();

        let mut entries = self.entries.lock();
        let id = entries.next_id;
        entries.next_id += 1;
        if entries.waiters.insert(key.clone(), Slot { id, tx }).is_some() {
            warn!(key = %key, "Replacing outstanding wait for key");
        }
        drop(entries);

        trace!(key = %key, "Registered waiter");
        Waiter {
            table: self,
            key,
            id,
            rx,
        }
    }

    /// Waits for the next message addressed to `key`.
    pub async fn wait(&self, key: impl Into<String>, timeout: Duration) -> CorrelationResult<M> {
        self.register(key).recv(timeout).await
    }

    /// Routes `message` to the waiter for `key`, or buffers it.
    pub fn dispatch(&self, key: &str, message: M) -> Delivery {
        let mut entries = self.entries.lock();

        let message = match entries.waiters.remove(key) {
            Some(slot) => match slot.tx.send(message) {
                Ok(()) => {
                    trace!(key = %key, "Delivered message to waiter");
                    return Delivery::Delivered;
                }
                // Receiver went away between registration and delivery.
                Err(message) => message,
            },
            None => message,
        };

        Self::buffer(&mut entries, key, message)
    }

    /// Appends `message` to the pending buffer of `key` directly.
    pub fn push_pending(&self, key: &str, message: M) -> Delivery {
        Self::buffer(&mut self.entries.lock(), key, message)
    }

    fn buffer(entries: &mut Entries<M>, key: &str, message: M) -> Delivery {
        let buffer = entries.pending.entry(key.to_string()).or_default();
        if buffer.len() >= MAX_PENDING_PER_KEY {
            debug!(key = %key, buffered = buffer.len(), "Pending buffer full, message discarded");
            return Delivery::Discarded;
        }
        buffer.push_back(message);
        debug!(key = %key, buffered = buffer.len(), "No waiter for key, message buffered");
        Delivery::Buffered
    }

    /// Whether a waiter is registered for `key`.
    pub fn has_waiter(&self, key: &str) -> bool {
        self.entries.lock().waiters.contains_key(key)
    }

    /// Number of buffered messages for `key`.
    pub fn pending_len(&self, key: &str) -> usize {
        self.entries.lock().pending.get(key).map_or(0, VecDeque::len)
    }

    fn deregister(&self, key: &str, id: u64) {
        let mut entries = self.entries.lock();
        if entries.waiters.get(key).is_some_and(|slot| slot.id == id) {
            entries.waiters.remove(key);
        }
    }
}

impl<M: ContentLength + Clone> CorrelationTable<M> {
    /// Takes buffered messages for `key` while they fit the content budget.
    ///
    /// Each message costs its content length plus the separator length.
    /// The first message that would push the running total past
    /// [`CONTENT_BUDGET`] is discarded together with everything after it.
    /// With `clear` the returned prefix is removed from the buffer as well.
    ///
    /// Returns the messages in arrival order and the new running total.
    pub fn drain_pending(&self, key: &str, clear: bool, current_len: usize) -> (Vec<M>, usize) {
        let overhead = HISTORY_SEPARATOR.len();
        let mut entries = self.entries.lock();

        let Some(buffer) = entries.pending.get_mut(key) else {
            return (Vec::new(), current_len);
        };

        let mut total = current_len;
        let mut fitting = 0;
        for message in buffer.iter() {
            let cost = message.content_len() + overhead;
            if total + cost > CONTENT_BUDGET {
                break;
            }
            total += cost;
            fitting += 1;
        }

        if fitting < buffer.len() {
            debug!(
                key = %key,
                dropped = buffer.len() - fitting,
                "Pending messages exceed content budget, discarding overflow"
            );
            buffer.truncate(fitting);
        }

        let messages: Vec<M> = if clear {
            buffer.drain(..).collect()
        } else {
            buffer.iter().cloned().collect()
        };

        if buffer.is_empty() {
            entries.pending.remove(key);
        }

        (messages, total)
    }
}

// =============================================================================
// Waiter
// =============================================================================

/// A registered, not yet resolved wait on one key.
///
/// Dropping the waiter removes its registration unless a newer waiter has
/// taken the slot.
pub struct Waiter<'a, M> {
    table: &'a CorrelationTable<M>,
    key: String,
    id: u64,
    rx: oneshot::Receiver<M>,
}

impl<M> Waiter<'_, M> {
    /// The key this waiter listens on.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Blocks until a message is delivered or `timeout` elapses.
    pub async fn recv(mut self, timeout: Duration) -> CorrelationResult<M> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(CorrelationError::Superseded {
                key: self.key.clone(),
            }),
            Err(_) => {
                debug!(key = %self.key, ?timeout, "Wait timed out");
                Err(CorrelationError::Timeout {
                    key: self.key.clone(),
                    timeout,
                })
            }
        }
    }
}

impl<M> Drop for Waiter<'_, M> {
    fn drop(&mut self) {
        self.table.deregister(&self.key, self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    struct Msg(String);

    impl ContentLength for Msg {
        fn content_len(&self) -> usize {
            self.0.len()
        }
    }

    fn msg(len: usize) -> Msg {
        Msg("x".repeat(len))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_deregisters() {
        let table = CorrelationTable::<Msg>::new();
        let start = Instant::now();

        let result = table.wait("u1", Duration::from_secs(2)).await;

        assert!(matches!(result, Err(CorrelationError::Timeout { ref key, .. }) if key == "u1"));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2100));
        assert!(!table.has_waiter("u1"));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_to_waiter_once() {
        let table = CorrelationTable::new();
        let waiter = table.register("u1");

        assert_eq!(table.dispatch("u1", msg(3)), Delivery::Delivered);
        assert_eq!(table.pending_len("u1"), 0);
        assert_eq!(waiter.recv(Duration::from_secs(1)).await.unwrap(), msg(3));

        // The slot is gone, so the next message is buffered.
        assert_eq!(table.dispatch("u1", msg(4)), Delivery::Buffered);
        assert_eq!(table.pending_len("u1"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_wait_receives_dispatch() {
        let table = std::sync::Arc::new(CorrelationTable::new());
        let waiting = {
            let table = table.clone();
            tokio::spawn(async move { table.wait("u1", Duration::from_secs(5)).await })
        };

        while !table.has_waiter("u1") {
            tokio::task::yield_now().await;
        }
        assert_eq!(table.dispatch("u1", msg(1)), Delivery::Delivered);
        assert_eq!(waiting.await.unwrap().unwrap(), msg(1));
    }

    #[test]
    fn test_buffered_message_is_drained() {
        let table = CorrelationTable::new();
        assert_eq!(table.dispatch("u1", msg(10)), Delivery::Buffered);

        let (messages, total) = table.drain_pending("u1", true, 0);
        assert_eq!(messages, vec![msg(10)]);
        assert_eq!(total, 10 + 21);
        assert_eq!(table.pending_len("u1"), 0);
    }

    #[test]
    fn test_drain_discards_overflow_permanently() {
        let table = CorrelationTable::new();
        // 4 CJK characters at 3 bytes each plus 9 dashes.
        assert_eq!(HISTORY_SEPARATOR.len(), 21);

        table.dispatch("u1", msg(1000));
        table.dispatch("u1", msg(900));
        // (1000 + 21) + (900 + 21) + (84 + 21) lands exactly on the budget.
        table.dispatch("u1", msg(84));
        table.dispatch("u1", msg(1));
        table.dispatch("u1", msg(1));

        let (messages, total) = table.drain_pending("u1", false, 0);
        assert_eq!(messages, vec![msg(1000), msg(900), msg(84)]);
        assert_eq!(total, 2047);

        // Overflowed messages do not come back on a later drain.
        let (messages, _) = table.drain_pending("u1", true, 0);
        assert_eq!(messages, vec![msg(1000), msg(900), msg(84)]);
        let (messages, total) = table.drain_pending("u1", true, 7);
        assert!(messages.is_empty());
        assert_eq!(total, 7);
    }

    #[test]
    fn test_drain_counts_current_length() {
        let table = CorrelationTable::new();
        table.dispatch("u1", msg(100));

        let (messages, total) = table.drain_pending("u1", true, CONTENT_BUDGET - 50);
        assert!(messages.is_empty());
        assert_eq!(total, CONTENT_BUDGET - 50);
        assert_eq!(table.pending_len("u1"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_wait_supersedes_first() {
        let table = CorrelationTable::new();
        let first = table.register("u1");
        let second = table.register("u1");

        let err = first.recv(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, CorrelationError::Superseded { key: "u1".into() });

        // Dropping the first waiter must not remove the second registration.
        assert!(table.has_waiter("u1"));
        table.dispatch("u1", msg(2));
        assert_eq!(second.recv(Duration::from_secs(1)).await.unwrap(), msg(2));
    }

    #[test]
    fn test_pending_buffer_is_capped_per_key() {
        let table = CorrelationTable::new();
        assert_eq!(MAX_PENDING_PER_KEY, 97);

        for _ in 0..MAX_PENDING_PER_KEY {
            assert_eq!(table.dispatch("u1", msg(0)), Delivery::Buffered);
        }
        assert_eq!(table.dispatch("u1", msg(0)), Delivery::Discarded);
        assert_eq!(table.push_pending("u1", msg(0)), Delivery::Discarded);
        assert_eq!(table.pending_len("u1"), MAX_PENDING_PER_KEY);
        assert_eq!(table.dispatch("u2", msg(0)), Delivery::Buffered);

        // A full buffer drains completely within the budget.
        let (messages, total) = table.drain_pending("u1", true, 0);
        assert_eq!(messages.len(), MAX_PENDING_PER_KEY);
        assert_eq!(total, 97 * 21);
        assert_eq!(table.dispatch("u1", msg(0)), Delivery::Buffered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_after_timeout_is_buffered() {
        let table = CorrelationTable::new();
        let _ = table.wait("u1", Duration::from_millis(10)).await;

        assert_eq!(table.dispatch("u1", msg(5)), Delivery::Buffered);
        assert_eq!(table.pending_len("u1"), 1);
    }
}
