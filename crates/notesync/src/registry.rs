//! Bookkeeping for every listener the gateway attaches.
//!
//! Each registration gets a [`SubscriptionId`] from a monotonically
//! increasing counter, so iterating the registry visits registrations in the
//! order they were made. Entries can be removed one at a time or drained all
//! at once; a drain always empties the registry completely.

use crate::path::StorePath;
use crate::store::{EventKind, ListenerHandle};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub path: StorePath,
    pub kind: EventKind,
    pub handle: ListenerHandle,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Registration>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: StorePath, kind: EventKind, handle: ListenerHandle) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.insert(id, Registration { path, kind, handle });
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Option<Registration> {
        self.entries.remove(&id)
    }

    /// Take every registration, in registration order, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<(SubscriptionId, Registration)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::schema;

    fn handle(n: u64) -> ListenerHandle {
        ListenerHandle(n)
    }

    #[test]
    fn test_drain_returns_registration_order_and_empties() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.register(schema::user("u1"), EventKind::Value, handle(7));
        let b = registry.register(schema::notes("u1"), EventKind::ChildAdded, handle(3));
        let c = registry.register(schema::user("u1"), EventKind::Value, handle(5));

        let drained: Vec<_> = registry.drain().into_iter().map(|(id, r)| (id, r.handle)).collect();
        assert_eq!(drained, vec![(a, handle(7)), (b, handle(3)), (c, handle(5))]);
        assert!(registry.is_empty());
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn test_remove_single() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.register(schema::user("u1"), EventKind::Value, handle(1));
        let b = registry.register(schema::user("u2"), EventKind::Value, handle(2));

        let removed = registry.remove(a).unwrap();
        assert_eq!(removed.path, schema::user("u1"));
        assert!(registry.remove(a).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove(b).unwrap().path, schema::user("u2"));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = SubscriptionRegistry::new();
        let a = registry.register(schema::user("u1"), EventKind::Value, handle(1));
        registry.drain();
        let b = registry.register(schema::user("u1"), EventKind::Value, handle(1));
        assert!(b > a);
        assert_eq!(b.to_string(), "sub-2");
    }
}
