//! Listener registry.
//!
//! Listeners are keyed by a unique name and subscribe to a set of
//! [`EventKind`]s (or to the `*` wildcard). [`ListenerRegistry::fire`] selects
//! the subscribers and bumps their fire statistics under the write lock, then
//! runs the handlers after the lock is released, so a handler may call back
//! into the registry.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::event::{Event, EventKind};
use crate::error::{HiveError, Result};

/// Callback invoked for every event a listener is subscribed to.
pub type ListenerHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Unique identifier for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered listener with its fire statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub id: ListenerId,
    pub name: String,
    pub events: BTreeSet<EventKind>,
    pub fire_count: u64,
    pub first_fired_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Locked listeners cannot be removed
    pub locked: bool,
}

impl Listener {
    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.events.contains(&kind) || self.events.contains(&EventKind::Any)
    }

    fn record_fire(&mut self, at: DateTime<Utc>) {
        self.fire_count += 1;
        self.last_fired_at = Some(at);
        if self.first_fired_at.is_none() {
            self.first_fired_at = Some(at);
        }
    }
}

struct Entry {
    listener: Listener,
    handler: ListenerHandler,
}

/// Event subscription table.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for `events`, merging into an existing listener of the
    /// same name. The existing handler is kept on merge.
    pub fn register<F>(&self, name: &str, events: &[EventKind], handler: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(name, events, Arc::new(handler), false)
    }

    /// Register a listener that control commands cannot remove.
    pub fn register_locked<F>(&self, name: &str, events: &[EventKind], handler: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(name, events, Arc::new(handler), true)
    }

    fn insert(
        &self,
        name: &str,
        events: &[EventKind],
        handler: ListenerHandler,
        locked: bool,
    ) -> Result<Listener> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HiveError::missing_field("name"));
        }
        if events.is_empty() {
            return Err(HiveError::missing_field("events"));
        }

        let (snapshot, added) = {
            let mut entries = self.entries.write();
            let entry = entries.entry(name.to_string()).or_insert_with(|| Entry {
                listener: Listener {
                    id: ListenerId::new(),
                    name: name.to_string(),
                    events: BTreeSet::new(),
                    fire_count: 0,
                    first_fired_at: None,
                    last_fired_at: None,
                    created_at: Utc::now(),
                    locked,
                },
                handler,
            });
            entry.listener.locked |= locked;

            let added: Vec<EventKind> = events
                .iter()
                .copied()
                .filter(|kind| entry.listener.events.insert(*kind))
                .collect();

            (entry.listener.clone(), added)
        };

        for kind in added {
            self.fire(&Event::listener_add(name, kind));
        }

        Ok(snapshot)
    }

    /// Fire `event` at every subscribed listener. Returns how many were invoked.
    pub fn fire(&self, event: &Event) -> usize {
        let handlers: Vec<ListenerHandler> = {
            let mut entries = self.entries.write();
            entries
                .values_mut()
                .filter(|entry| entry.listener.is_subscribed(event.kind))
                .map(|entry| {
                    entry.listener.record_fire(event.fired_at);
                    entry.handler.clone()
                })
                .collect()
        };

        for handler in &handlers {
            handler(event);
        }

        handlers.len()
    }

    /// Fire a batch of events in order.
    pub fn fire_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.fire(&event);
        }
    }

    /// Remove a listener, or only some of its subscriptions.
    ///
    /// Without `events` the listener goes entirely; with `events` only those
    /// subscriptions go, and the listener is dropped once none remain.
    /// Returns the listener as it stands afterwards.
    pub fn remove(&self, name: &str, events: Option<&[EventKind]>) -> Result<Listener> {
        let (snapshot, removed) = {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| HiveError::listener_not_found(name))?;
            if entry.listener.locked {
                return Err(HiveError::locked_listener(name));
            }

            let removed: Vec<EventKind> = match events {
                Some(events) => events
                    .iter()
                    .copied()
                    .filter(|kind| entry.listener.events.remove(kind))
                    .collect(),
                None => std::mem::take(&mut entry.listener.events).into_iter().collect(),
            };

            let snapshot = entry.listener.clone();
            if snapshot.events.is_empty() {
                entries.remove(name);
            }
            (snapshot, removed)
        };

        for kind in removed {
            self.fire(&Event::listener_remove(name, kind));
        }

        Ok(snapshot)
    }

    /// Remove every unlocked listener.
    pub fn remove_unlocked(&self) -> Vec<Listener> {
        let names: Vec<String> = self
            .entries
            .read()
            .values()
            .filter(|entry| !entry.listener.locked)
            .map(|entry| entry.listener.name.clone())
            .collect();

        names
            .iter()
            .filter_map(|name| self.remove(name, None).ok())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Listener> {
        self.entries.read().get(name).map(|e| e.listener.clone())
    }

    /// All listeners, oldest first.
    pub fn list(&self) -> Vec<Listener> {
        let mut listeners: Vec<Listener> = self
            .entries
            .read()
            .values()
            .map(|e| e.listener.clone())
            .collect();
        listeners.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        listeners
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total subscriptions across all listeners.
    pub fn subscriptions(&self) -> usize {
        self.entries
            .read()
            .values()
            .map(|e| e.listener.events.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Event) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = count.clone();
        (count, move |_: &Event| {
            clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_register_and_fire() {
        let registry = ListenerRegistry::new();
        let (count, handler) = counter();
        registry
            .register("audit", &[EventKind::TaskSuccess], handler)
            .unwrap();

        assert_eq!(registry.fire(&Event::new(EventKind::TaskSuccess, serde_json::json!({}))), 1);
        assert_eq!(registry.fire(&Event::new(EventKind::TaskFail, serde_json::json!({}))), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let listener = registry.get("audit").unwrap();
        assert_eq!(listener.fire_count, 1);
        assert!(listener.first_fired_at.is_some());
        assert_eq!(listener.first_fired_at, listener.last_fired_at);
    }

    #[test]
    fn test_register_merges_events() {
        let registry = ListenerRegistry::new();
        let first = registry
            .register("audit", &[EventKind::TaskSuccess], |_| {})
            .unwrap();
        let merged = registry
            .register("audit", &[EventKind::TaskFail, EventKind::TaskSuccess], |_| {})
            .unwrap();

        assert_eq!(first.id, merged.id);
        assert_eq!(merged.events.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_wildcard_subscription() {
        let registry = ListenerRegistry::new();
        let (count, handler) = counter();
        registry.register("all", &[EventKind::Any], handler).unwrap();
        // its own listener.add
        assert_eq!(count.load(Ordering::SeqCst), 1);

        registry.fire(&Event::new(EventKind::WorkerAdd, serde_json::json!({})));
        registry.fire(&Event::new(EventKind::TaskKill, serde_json::json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_listener_events_fire_at_wildcard() {
        let registry = ListenerRegistry::new();
        let (count, handler) = counter();
        registry.register("all", &[EventKind::Any], handler).unwrap();
        let baseline = count.load(Ordering::SeqCst);

        registry.register("other", &[EventKind::TaskAdd], |_| {}).unwrap();
        registry.remove("other", None).unwrap();
        // one listener.add and one listener.remove for "other"
        assert_eq!(count.load(Ordering::SeqCst), baseline + 2);
    }

    #[test]
    fn test_remove_some_events() {
        let registry = ListenerRegistry::new();
        registry
            .register("audit", &[EventKind::TaskSuccess, EventKind::TaskFail], |_| {})
            .unwrap();

        let left = registry.remove("audit", Some(&[EventKind::TaskFail])).unwrap();
        assert_eq!(left.events.len(), 1);
        assert!(registry.get("audit").is_some());

        registry.remove("audit", Some(&[EventKind::TaskSuccess])).unwrap();
        assert!(registry.get("audit").is_none());
    }

    #[test]
    fn test_remove_errors() {
        let registry = ListenerRegistry::new();
        registry
            .register_locked("system", &[EventKind::Any], |_| {})
            .unwrap();

        let err = registry.remove("system", None).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::LockedListener);
        assert!(registry.remove("ghost", None).unwrap_err().is_not_found());
        assert!(registry.get("system").is_some());
    }

    #[test]
    fn test_remove_unlocked() {
        let registry = ListenerRegistry::new();
        registry.register_locked("system", &[EventKind::Any], |_| {}).unwrap();
        registry.register("a", &[EventKind::TaskAdd], |_| {}).unwrap();
        registry.register("b", &[EventKind::TaskAdd], |_| {}).unwrap();

        assert_eq!(registry.remove_unlocked().len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_requires_events() {
        let registry = ListenerRegistry::new();
        assert!(registry.register("empty", &[], |_| {}).is_err());
        assert!(registry.register("  ", &[EventKind::Any], |_| {}).is_err());
    }

    #[test]
    fn test_handler_may_reenter_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let inner = registry.clone();
        registry
            .register("reentrant", &[EventKind::TaskAdd], move |_| {
                let _ = inner.list();
            })
            .unwrap();

        assert_eq!(registry.fire(&Event::new(EventKind::TaskAdd, serde_json::json!({}))), 1);
    }
}
