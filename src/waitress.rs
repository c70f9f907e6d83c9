//! Correlation registry for inbound traffic.
//!
//! Callers register a [`Matcher`] before sending and await the returned
//! [`Waiter`]; the read loop feeds every decoded object through
//! [`Waitress::resolve`], which completes all matching waiters. Waiters
//! that time out or are dropped are purged lazily on the next sweep, so
//! the registry never needs its own background task.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Result, ZnpError};
use crate::framing::Direction;
use crate::object::ZnpObject;
use crate::payload::Value;
use crate::schema::Subsystem;

/// Predicate over inbound objects.
///
/// Matches on direction, subsystem and command name, plus any number of
/// payload field equalities added with [`Matcher::with`].
#[derive(Debug, Clone)]
pub struct Matcher {
    pub direction: Direction,
    pub subsystem: Subsystem,
    pub command: String,
    payload: Vec<(String, Value)>,
}

impl Matcher {
    pub fn new(direction: Direction, subsystem: Subsystem, command: impl Into<String>) -> Self {
        Self {
            direction,
            subsystem,
            command: command.into(),
            payload: Vec::new(),
        }
    }

    /// Require a payload field to equal the given value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.push((name.into(), value.into()));
        self
    }

    pub fn matches(&self, object: &ZnpObject) -> bool {
        object.direction == self.direction
            && object.subsystem == self.subsystem
            && object.command.name == self.command
            && self
                .payload
                .iter()
                .all(|(name, value)| object.payload.get(name) == Some(value))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?} - {}", self.direction, self.subsystem, self.command)?;
        for (name, value) in &self.payload {
            write!(f, " {name}={value:?}")?;
        }
        Ok(())
    }
}

struct PendingWaiter {
    matcher: Matcher,
    tx: oneshot::Sender<ZnpObject>,
}

/// Shared registry of pending waiters.
#[derive(Default)]
pub struct Waitress {
    waiters: Mutex<HashMap<u64, PendingWaiter>>,
    next_id: AtomicU64,
}

impl Waitress {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map holds no invariant a panicked holder could break, so a
    /// poisoned lock is recovered rather than losing registrations.
    fn waiters(&self) -> MutexGuard<'_, HashMap<u64, PendingWaiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a waiter. Registration happens before the triggering write
    /// goes out, so a fast reply can never race past it.
    pub fn wait_for(self: &Arc<Self>, matcher: Matcher, timeout: Duration) -> Waiter {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let entry = PendingWaiter {
            matcher: matcher.clone(),
            tx,
        };
        self.waiters().insert(id, entry);
        Waiter {
            id,
            rx,
            timeout,
            matcher,
            waitress: Arc::clone(self),
        }
    }

    /// Offer an inbound object to every pending waiter.
    ///
    /// Completes and removes all matching entries; entries whose receiver
    /// is gone (timed out or dropped) are purged first and never resolve.
    /// Returns whether at least one waiter was completed.
    pub fn resolve(&self, object: &ZnpObject) -> bool {
        let mut waiters = self.waiters();

        waiters.retain(|_, entry| !entry.tx.is_closed());

        let matching: Vec<u64> = waiters
            .iter()
            .filter(|(_, entry)| entry.matcher.matches(object))
            .map(|(id, _)| *id)
            .collect();

        let resolved = !matching.is_empty();
        for id in matching {
            if let Some(entry) = waiters.remove(&id) {
                trace!(waiter = id, matcher = %entry.matcher, "resolved");
                // Receiver may have been dropped between the sweep and now.
                let _ = entry.tx.send(object.clone());
            }
        }
        resolved
    }

    /// Drop every pending waiter; their receivers observe cancellation.
    pub fn cancel_all(&self) {
        self.waiters().clear();
    }

    pub fn remove(&self, id: u64) {
        self.waiters().remove(&id);
    }

    pub fn pending_count(&self) -> usize {
        self.waiters().len()
    }
}

/// Handle to one registered waiter.
pub struct Waiter {
    id: u64,
    rx: oneshot::Receiver<ZnpObject>,
    timeout: Duration,
    matcher: Matcher,
    waitress: Arc<Waitress>,
}

impl Waiter {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Await the matching object, the registry-wide cancellation, or the
    /// deadline, whichever comes first.
    pub async fn receive(mut self) -> Result<ZnpObject> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(object)) => Ok(object),
            Ok(Err(_)) => Err(ZnpError::Cancelled),
            Err(_) => {
                self.waitress.remove(self.id);
                Err(ZnpError::Timeout {
                    matcher: self.matcher.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// Unregister without waiting.
    pub fn cancel(self) {
        self.waitress.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use crate::payload::Payload;

    use super::*;

    fn confirm(transid: u8) -> ZnpObject {
        ZnpObject::request(
            Subsystem::Af,
            "dataConfirm",
            Payload::new()
                .with("status", 0u8)
                .with("endpoint", 1u8)
                .with("transid", transid),
        )
        .unwrap()
    }

    fn confirm_matcher(transid: u8) -> Matcher {
        Matcher::new(Direction::Areq, Subsystem::Af, "dataConfirm").with("transid", transid)
    }

    #[test]
    fn test_matcher_checks_payload_fields() {
        let matcher = confirm_matcher(7);
        assert!(matcher.matches(&confirm(7)));
        assert!(!matcher.matches(&confirm(8)));

        let wrong_command = Matcher::new(Direction::Areq, Subsystem::Af, "incomingMsg");
        assert!(!wrong_command.matches(&confirm(7)));
    }

    #[tokio::test]
    async fn test_resolve_completes_matching_waiter() {
        let waitress = Arc::new(Waitress::new());
        let waiter = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));
        assert_eq!(waitress.pending_count(), 1);

        assert!(!waitress.resolve(&confirm(8)));
        assert!(waitress.resolve(&confirm(7)));
        assert_eq!(waitress.pending_count(), 0);

        let object = waiter.receive().await.unwrap();
        assert_eq!(object.payload.u8("transid").unwrap(), 7);
    }

    #[tokio::test]
    async fn test_resolve_completes_all_matching_waiters() {
        let waitress = Arc::new(Waitress::new());
        let first = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));
        let second = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));

        assert!(waitress.resolve(&confirm(7)));
        assert!(first.receive().await.is_ok());
        assert!(second.receive().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_waiter_never_resolves() {
        let waitress = Arc::new(Waitress::new());
        let waiter = waitress.wait_for(confirm_matcher(7), Duration::from_millis(100));

        let result = waiter.receive().await;
        assert!(matches!(result, Err(ZnpError::Timeout { .. })));

        // The entry is gone; a late arrival resolves nothing.
        assert!(!waitress.resolve(&confirm(7)));
        assert_eq!(waitress.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_purged_on_next_sweep() {
        let waitress = Arc::new(Waitress::new());
        let waiter = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));
        drop(waiter.rx);

        assert!(!waitress.resolve(&confirm(7)));
        assert_eq!(waitress.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_cancels_receivers() {
        let waitress = Arc::new(Waitress::new());
        let waiter = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));

        waitress.cancel_all();
        assert!(matches!(waiter.receive().await, Err(ZnpError::Cancelled)));
    }

    #[tokio::test]
    async fn test_poisoned_lock_still_registers_and_resolves() {
        let waitress = Arc::new(Waitress::new());
        let poison = Arc::clone(&waitress);
        let _ = std::thread::spawn(move || {
            let _guard = poison.waiters.lock().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        let waiter = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));
        assert_eq!(waitress.pending_count(), 1);
        assert!(waitress.resolve(&confirm(7)));
        assert!(waiter.receive().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_unregisters() {
        let waitress = Arc::new(Waitress::new());
        let waiter = waitress.wait_for(confirm_matcher(7), Duration::from_secs(1));
        waiter.cancel();
        assert_eq!(waitress.pending_count(), 0);
    }
}
