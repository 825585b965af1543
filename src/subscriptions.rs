use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::waapi::SubscriptionHandle;

/// A live topic subscription: the authoring app's handle plus the bounded
/// event stream the transport feeds.
struct SubscriptionEntry {
    handle: SubscriptionHandle,
    uri: String,
    /// Bounded channel written by the transport with a non-blocking send
    /// (drop-newest on overflow).
    events: mpsc::Receiver<Value>,
    /// Events pulled off the channel by a `clear = false` drain; they stay
    /// readable until a clearing drain removes them.
    peeked: VecDeque<Value>,
}

impl SubscriptionEntry {
    /// Move everything currently buffered in the channel into `peeked`.
    /// Never blocks: `try_recv` stops at the first empty read.
    fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.peeked.push_back(event);
        }
    }
}

/// Registry of live subscriptions, keyed by a server-generated UUID.
///
/// The registry lock guards short, non-blocking critical sections only;
/// it is never held across an RPC or channel wait.
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<Uuid, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SubscriptionEntry>> {
        self.entries.lock().expect("subscription registry lock poisoned")
    }

    /// Register a subscription, returning its client-visible id.
    pub fn register(
        &self,
        uri: &str,
        handle: SubscriptionHandle,
        events: mpsc::Receiver<Value>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            SubscriptionEntry {
                handle,
                uri: uri.to_owned(),
                events,
                peeked: VecDeque::new(),
            },
        );
        id
    }

    /// Read up to `max_count` buffered events, removing them iff `clear`.
    ///
    /// Always non-blocking; an unknown id yields an empty list.
    pub fn drain(&self, id: Uuid, max_count: Option<usize>, clear: bool) -> Vec<Value> {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&id) else {
            return Vec::new();
        };
        entry.pump();

        let limit = max_count.unwrap_or(usize::MAX).min(entry.peeked.len());
        if clear {
            entry.peeked.drain(..limit).collect()
        } else {
            entry.peeked.iter().take(limit).cloned().collect()
        }
    }

    /// Remove a subscription, returning its handle and any still-buffered
    /// events. Used by the dispatcher during unsubscribe and shutdown.
    pub fn remove(&self, id: Uuid) -> Option<(SubscriptionHandle, Vec<Value>)> {
        let mut entry = self.lock().remove(&id)?;
        entry.pump();
        Some((entry.handle, entry.peeked.into_iter().collect()))
    }

    /// Remove every subscription, returning `(id, handle)` pairs for
    /// cleanup unsubscribes.
    pub fn remove_all(&self) -> Vec<(Uuid, SubscriptionHandle)> {
        self.lock()
            .drain()
            .map(|(id, entry)| (id, entry.handle))
            .collect()
    }

    /// The topic URI a subscription was registered for.
    #[must_use]
    pub fn uri_of(&self, id: Uuid) -> Option<String> {
        self.lock().get(&id).map(|e| e.uri.clone())
    }

    /// Ids of all live subscriptions.
    #[must_use]
    pub fn ids(&self) -> Vec<Uuid> {
        self.lock().keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with_events(events: &[Value], capacity: usize) -> (SubscriptionRegistry, Uuid) {
        let registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::channel(capacity);
        for event in events {
            tx.try_send(event.clone()).unwrap();
        }
        let id = registry.register("ak.wwise.core.object.created", 7, rx);
        (registry, id)
    }

    #[test]
    fn drain_returns_events_in_arrival_order() {
        let events = [json!({"n": 1}), json!({"n": 2}), json!({"n": 3})];
        let (registry, id) = registry_with_events(&events, 8);

        let drained = registry.drain(id, None, true);
        assert_eq!(drained, events);
        assert!(registry.drain(id, None, true).is_empty());
    }

    #[test]
    fn drain_respects_max_count() {
        let events = [json!(1), json!(2), json!(3)];
        let (registry, id) = registry_with_events(&events, 8);

        assert_eq!(registry.drain(id, Some(2), true), vec![json!(1), json!(2)]);
        assert_eq!(registry.drain(id, Some(2), true), vec![json!(3)]);
    }

    #[test]
    fn non_clearing_drain_keeps_events() {
        let events = [json!("a"), json!("b")];
        let (registry, id) = registry_with_events(&events, 8);

        assert_eq!(registry.drain(id, None, false), events);
        assert_eq!(registry.drain(id, None, false), events);
        assert_eq!(registry.drain(id, None, true), events);
        assert!(registry.drain(id, None, false).is_empty());
    }

    #[test]
    fn unknown_id_yields_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.drain(Uuid::new_v4(), None, true).is_empty());
        assert!(registry.remove(Uuid::new_v4()).is_none());
    }

    #[test]
    fn remove_returns_handle_and_leftovers() {
        let events = [json!(10), json!(20)];
        let (registry, id) = registry_with_events(&events, 8);

        let (handle, leftover) = registry.remove(id).unwrap();
        assert_eq!(handle, 7);
        assert_eq!(leftover, events);
        assert!(registry.is_empty());
    }

    #[test]
    fn full_channel_drops_newest() {
        let registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::channel(2);
        tx.try_send(json!(1)).unwrap();
        tx.try_send(json!(2)).unwrap();
        // Buffer full: the producer's non-blocking push discards this one.
        assert!(tx.try_send(json!(3)).is_err());
        let id = registry.register("topic", 1, rx);

        assert_eq!(registry.drain(id, None, true), vec![json!(1), json!(2)]);
    }

    #[test]
    fn remove_all_lists_every_handle() {
        let registry = SubscriptionRegistry::new();
        let (_tx1, rx1) = mpsc::channel(2);
        let (_tx2, rx2) = mpsc::channel(2);
        let id1 = registry.register("t1", 1, rx1);
        let id2 = registry.register("t2", 2, rx2);

        let mut removed = registry.remove_all();
        removed.sort_by_key(|(_, handle)| *handle);
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().any(|(id, h)| *id == id1 && *h == 1));
        assert!(removed.iter().any(|(id, h)| *id == id2 && *h == 2));
        assert!(registry.is_empty());
    }
}
