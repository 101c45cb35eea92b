//! Listener registry for coordinator notifications.
//!
//! Listeners are plain closures keyed by [`NotificationKind`]. They run on
//! the coordinator task, so they must return quickly; the usual pattern is
//! to forward the notification into a channel.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cadence_protocol::{Notification, NotificationKind};

/// Error a listener may return. Logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A subscribed notification callback.
pub type Listener = Arc<dyn Fn(&Notification) -> Result<(), ListenerError> + Send + Sync>;

/// Returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<NotificationKind, Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers one listener for every kind in `kinds`. Duplicate kinds
    /// are registered once.
    pub(crate) fn subscribe(&mut self, kinds: &[NotificationKind], listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        for kind in kinds {
            let slot = self.listeners.entry(*kind).or_default();
            if !slot.iter().any(|(existing, _)| *existing == id) {
                slot.push((id, Arc::clone(&listener)));
            }
        }
        tracing::debug!(listener_id = %id, kinds = kinds.len(), "listener subscribed");
        id
    }

    /// Removes a listener from every kind. Returns `false` if it was not
    /// registered.
    pub(crate) fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        for slot in self.listeners.values_mut() {
            let before = slot.len();
            slot.retain(|(existing, _)| *existing != id);
            removed |= slot.len() != before;
        }
        self.listeners.retain(|_, slot| !slot.is_empty());
        removed
    }

    /// Delivers `notification` to every listener of its kind, in
    /// subscription order. A listener that errors or panics is logged and
    /// skipped. Returns how many listeners completed successfully.
    pub(crate) fn emit(&self, notification: &Notification) -> usize {
        let kind = notification.kind();
        let Some(slot) = self.listeners.get(&kind) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, listener) in slot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(listener_id = %id, ?kind, error = %e, "listener failed");
                }
                Err(_) => {
                    tracing::error!(listener_id = %id, ?kind, "listener panicked");
                }
            }
        }
        delivered
    }

    pub(crate) fn len(&self) -> usize {
        let mut ids: Vec<ListenerId> = self
            .listeners
            .values()
            .flat_map(|slot| slot.iter().map(|(id, _)| *id))
            .collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_protocol::Phase;
    use std::sync::Mutex;

    fn phase_changed() -> Notification {
        Notification::PhaseChanged {
            new_phase: Phase::Intermission,
            timestamp: 1,
        }
    }

    fn counter() -> (Arc<Mutex<u32>>, Listener) {
        let count = Arc::new(Mutex::new(0));
        let inner = Arc::clone(&count);
        let listener: Listener = Arc::new(move |_| {
            *inner.lock().unwrap() += 1;
            Ok(())
        });
        (count, listener)
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let mut registry = ListenerRegistry::new();
        let (phase_count, phase_listener) = counter();
        let (reset_count, reset_listener) = counter();
        registry.subscribe(&[NotificationKind::PhaseChanged], phase_listener);
        registry.subscribe(&[NotificationKind::ServerReset], reset_listener);

        assert_eq!(registry.emit(&phase_changed()), 1);

        assert_eq!(*phase_count.lock().unwrap(), 1);
        assert_eq!(*reset_count.lock().unwrap(), 0);
    }

    #[test]
    fn test_emit_isolates_failing_and_panicking_listeners() {
        let mut registry = ListenerRegistry::new();
        registry.subscribe(
            &[NotificationKind::PhaseChanged],
            Arc::new(|_| Err("listener is broken".into())),
        );
        registry.subscribe(
            &[NotificationKind::PhaseChanged],
            Arc::new(|_| panic!("listener exploded")),
        );
        let (count, listener) = counter();
        registry.subscribe(&[NotificationKind::PhaseChanged], listener);

        assert_eq!(registry.emit(&phase_changed()), 1);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_subscribe_duplicate_kinds_registers_once() {
        let mut registry = ListenerRegistry::new();
        let (count, listener) = counter();
        registry.subscribe(
            &[NotificationKind::PhaseChanged, NotificationKind::PhaseChanged],
            listener,
        );

        registry.emit(&phase_changed());

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_from_all_kinds() {
        let mut registry = ListenerRegistry::new();
        let (count, listener) = counter();
        let id = registry.subscribe(&NotificationKind::ALL, listener);
        assert_eq!(registry.len(), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));

        assert_eq!(registry.emit(&phase_changed()), 0);
        assert_eq!(*count.lock().unwrap(), 0);
        assert_eq!(registry.len(), 0);
    }
}
