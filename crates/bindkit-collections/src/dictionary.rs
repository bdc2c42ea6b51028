#![forbid(unsafe_code)]

//! Observable map.
//!
//! [`BindableDictionary`] reports insertions, replacements and removals per
//! key, and batch operations as single bulk notifications. Per-key events
//! carry `MemberKey::Key(k)` and go to the key's own handle when one was
//! requested through [`key_handle`](BindableDictionary::key_handle), so a
//! subscriber can watch one key without seeing the rest of the map.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;

use ahash::AHashMap;
use bindkit_core::{
    BindError, Bindable, Bindings, Change, ChangeKind, Dispatcher, Handle, MemberKey, Value,
    value,
};

use crate::link::{Linkable, Linker, linker};

/// A hash map whose mutations are observable.
pub struct BindableDictionary<K, V> {
    bindings: Bindings,
    entries: RefCell<AHashMap<K, V>>,
    /// Value per key from before the first unpublished raw change; `None`
    /// when the key was absent.
    pending: RefCell<AHashMap<K, Option<V>>>,
    linker: Option<Linker<V>>,
}

impl<K, V> Default for BindableDictionary<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> BindableDictionary<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + 'static,
{
    /// Create an empty dictionary in the thread's default dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::in_dispatcher(&Dispatcher::current())
    }

    /// Create an empty dictionary in `dispatcher`.
    #[must_use]
    pub fn in_dispatcher(dispatcher: &Dispatcher) -> Self {
        Self::build(dispatcher, None)
    }

    fn build(dispatcher: &Dispatcher, linker: Option<Linker<V>>) -> Self {
        Self {
            bindings: Bindings::in_dispatcher(dispatcher),
            entries: RefCell::new(AHashMap::new()),
            pending: RefCell::new(AHashMap::new()),
            linker,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the dictionary holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Clone the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.borrow().get(key).cloned()
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Clone the keys, in unspecified order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Borrow the entries.
    pub fn with<R>(&self, f: impl FnOnce(&AHashMap<K, V>) -> R) -> R {
        f(&self.entries.borrow())
    }

    /// The dedicated handle for `key`, created on first use.
    ///
    /// # Errors
    ///
    /// Never fails for dictionary keys; the `Result` mirrors
    /// [`Bindable::get_handle`].
    pub fn key_handle(&self, key: &K) -> Result<Handle, BindError> {
        self.get_handle(MemberKey::key(key.clone()))
    }

    // ── Notifying mutators ──────────────────────────────────────────────

    /// Insert or replace. Publishes `Replace (old, new)` for an existing key
    /// and `Add (none, new)` otherwise. Returns the previous value.
    pub fn insert(&self, key: K, item: V) -> Option<V> {
        let old = self.raw_insert_inner(key.clone(), item.clone());
        self.pending.borrow_mut().remove(&key);
        let change = match &old {
            Some(old) => Change::replaced(old.clone(), item),
            None => Change::added(item),
        };
        self.emit(change.with_member(MemberKey::key(key)));
        old
    }

    /// Insert a new key.
    ///
    /// # Errors
    ///
    /// [`BindError::DuplicateKey`] if the key is already present; the
    /// dictionary is unchanged.
    pub fn add(&self, key: K, item: V) -> Result<(), BindError> {
        if self.contains_key(&key) {
            return Err(BindError::DuplicateKey {
                key: format!("{key:?}"),
            });
        }
        self.insert(key, item);
        Ok(())
    }

    /// Remove a key, publishing `Remove (old, none)` if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let old = self.raw_remove_inner(key)?;
        self.pending.borrow_mut().remove(key);
        self.emit(Change::removed(old.clone()).with_member(MemberKey::key(key.clone())));
        Some(old)
    }

    /// Remove several keys with one `RemoveRange` notification. Absent keys
    /// are ignored; nothing is published if none was present.
    pub fn remove_keys(&self, keys: impl IntoIterator<Item = K>) -> Vec<(K, V)> {
        let removed = self.raw_remove_keys_inner(keys);
        if !removed.is_empty() {
            let mut pending = self.pending.borrow_mut();
            for (key, _) in &removed {
                pending.remove(key);
            }
            drop(pending);
            self.emit(Change::new(ChangeKind::RemoveRange));
        }
        removed
    }

    /// Insert several entries with one `AddRange` notification.
    pub fn extend(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let touched = self.raw_extend_inner(entries);
        let mut pending = self.pending.borrow_mut();
        for (key, _) in &touched {
            pending.remove(key);
        }
        drop(pending);
        self.emit(Change::new(ChangeKind::AddRange));
    }

    /// Remove every entry with one `Clear` notification.
    pub fn clear(&self) {
        self.raw_clear_inner();
        self.pending.borrow_mut().clear();
        self.emit(Change::new(ChangeKind::Clear));
    }

    /// Re-publish `key` as `(old, current)`, where old is the value from
    /// before any unpublished raw change. Returns whether anything was
    /// published.
    pub fn publish_key(&self, key: &K) -> bool {
        let pending = self.pending.borrow_mut().remove(key);
        let current = self.get(key);
        let old = match pending {
            Some(old) => old,
            None if current.is_some() => current.clone(),
            None => return false,
        };
        self.emit(Change {
            kind: ChangeKind::Publish,
            member: Some(MemberKey::key(key.clone())),
            old: old.map(value),
            new: current.map(value),
        });
        true
    }

    // ── Raw mutators ────────────────────────────────────────────────────

    /// [`insert`](Self::insert) without notifying.
    pub fn raw_insert(&self, key: K, item: V) -> Option<V> {
        let old = self.raw_insert_inner(key.clone(), item);
        self.remember(key, old.clone());
        old
    }

    /// [`remove`](Self::remove) without notifying.
    pub fn raw_remove(&self, key: &K) -> Option<V> {
        let old = self.raw_remove_inner(key)?;
        self.remember(key.clone(), Some(old.clone()));
        Some(old)
    }

    /// [`remove_keys`](Self::remove_keys) without notifying.
    pub fn raw_remove_keys(&self, keys: impl IntoIterator<Item = K>) -> Vec<(K, V)> {
        let removed = self.raw_remove_keys_inner(keys);
        for (key, old) in &removed {
            self.remember(key.clone(), Some(old.clone()));
        }
        removed
    }

    /// [`extend`](Self::extend) without notifying.
    pub fn raw_extend(&self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, old) in self.raw_extend_inner(entries) {
            self.remember(key, old);
        }
    }

    /// [`clear`](Self::clear) without notifying.
    pub fn raw_clear(&self) {
        for (key, old) in self.raw_clear_inner() {
            self.remember(key, Some(old));
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn remember(&self, key: K, old: Option<V>) {
        self.pending.borrow_mut().entry(key).or_insert(old);
    }

    fn attach(&self, item: &V) {
        if let Some(link) = self.linker {
            link(item, Some(&self.bindings.all_members()));
        }
    }

    fn detach_item(&self, item: &V) {
        if let Some(link) = self.linker {
            link(item, None);
        }
    }

    fn raw_insert_inner(&self, key: K, item: V) -> Option<V> {
        let old = self.entries.borrow_mut().insert(key, item.clone());
        if let Some(old) = &old {
            self.detach_item(old);
        }
        self.attach(&item);
        old
    }

    fn raw_remove_inner(&self, key: &K) -> Option<V> {
        let old = self.entries.borrow_mut().remove(key)?;
        self.detach_item(&old);
        Some(old)
    }

    fn raw_remove_keys_inner(&self, keys: impl IntoIterator<Item = K>) -> Vec<(K, V)> {
        let removed: Vec<(K, V)> = {
            let mut entries = self.entries.borrow_mut();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|old| (key, old)))
                .collect()
        };
        for (_, old) in &removed {
            self.detach_item(old);
        }
        removed
    }

    /// Returns each inserted key with the value it replaced.
    fn raw_extend_inner(&self, entries: impl IntoIterator<Item = (K, V)>) -> Vec<(K, Option<V>)> {
        let mut touched = Vec::new();
        for (key, item) in entries {
            let old = self.entries.borrow_mut().insert(key.clone(), item.clone());
            if let Some(old) = &old {
                self.detach_item(old);
            }
            self.attach(&item);
            touched.push((key, old));
        }
        touched
    }

    fn raw_clear_inner(&self) -> Vec<(K, V)> {
        let removed: Vec<(K, V)> = self.entries.borrow_mut().drain().collect();
        for (_, old) in &removed {
            self.detach_item(old);
        }
        removed
    }

    fn emit(&self, change: Change) {
        tracing::trace!(kind = ?change.kind, len = self.len(), "dictionary change");
        self.bindings.publish_change(change);
    }
}

impl<K, V> BindableDictionary<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + Linkable + 'static,
{
    /// Create an empty dictionary that links inserted values to itself.
    #[must_use]
    pub fn new_linked() -> Self {
        Self::linked_in(&Dispatcher::current())
    }

    /// Create an empty linking dictionary in `dispatcher`.
    #[must_use]
    pub fn linked_in(dispatcher: &Dispatcher) -> Self {
        Self::build(dispatcher, linker::<V>())
    }
}

impl<K, V> Bindable for BindableDictionary<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    V: Clone + 'static,
{
    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn member_value(&self, member: &MemberKey) -> Option<Value> {
        match member {
            MemberKey::All => Some(value(self.entries.borrow().clone())),
            MemberKey::Key(_) => member
                .downcast_key::<K>()
                .and_then(|key| self.get(key))
                .map(value),
            _ => None,
        }
    }
}

impl<K, V> Drop for BindableDictionary<K, V> {
    fn drop(&mut self) {
        if let Some(link) = self.linker {
            for item in self.entries.get_mut().values() {
                link(item, None);
            }
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BindableDictionary<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindableDictionary")
            .field("entries", &*self.entries.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use bindkit_core::{Payload, SubscribeOptions};

    use super::*;

    type Dict = BindableDictionary<&'static str, i32>;
    type Events = Rc<RefCell<Vec<(ChangeKind, Option<&'static str>, Option<i32>, Option<i32>)>>>;

    fn dict() -> Dict {
        BindableDictionary::in_dispatcher(&Dispatcher::new())
    }

    fn record(d: &Dict) -> Events {
        let events: Events = Rc::default();
        let e = Rc::clone(&events);
        d.subscribe(move |p: &Payload| {
            e.borrow_mut().push((
                p.kind(),
                p.member().downcast_key::<&'static str>().copied(),
                p.old::<i32>().copied(),
                p.new::<i32>().copied(),
            ));
        });
        events
    }

    #[test]
    fn insert_adds_then_replaces() {
        let d = dict();
        let events = record(&d);
        assert_eq!(d.insert("hp", 10), None);
        assert_eq!(d.insert("hp", 12), Some(10));
        assert_eq!(
            *events.borrow(),
            vec![
                (ChangeKind::Add, Some("hp"), None, Some(10)),
                (ChangeKind::Replace, Some("hp"), Some(10), Some(12)),
            ]
        );
    }

    #[test]
    fn add_rejects_duplicates() {
        let d = dict();
        d.add("hp", 1).unwrap();
        assert_eq!(
            d.add("hp", 2).unwrap_err(),
            BindError::DuplicateKey {
                key: "\"hp\"".into()
            }
        );
        assert_eq!(d.get(&"hp"), Some(1));
    }

    #[test]
    fn remove_reports_old() {
        let d = dict();
        d.raw_insert("mp", 3);
        let events = record(&d);
        assert_eq!(d.remove(&"mp"), Some(3));
        assert_eq!(d.remove(&"mp"), None);
        assert_eq!(
            *events.borrow(),
            vec![(ChangeKind::Remove, Some("mp"), Some(3), None)]
        );
    }

    #[test]
    fn bulk_operations_publish_once() {
        let d = dict();
        let events = record(&d);
        d.extend([("a", 1), ("b", 2), ("c", 3)]);
        d.remove_keys(["a", "b", "zz"]);
        d.remove_keys(["zz"]);
        d.clear();
        let kinds: Vec<ChangeKind> = events.borrow().iter().map(|e| e.0).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::AddRange, ChangeKind::RemoveRange, ChangeKind::Clear]
        );
        assert!(d.is_empty());
    }

    #[test]
    fn raw_insert_then_publish_matches_insert() {
        let d = dict();
        d.raw_insert("hp", 1);
        d.publish_key(&"hp");
        let events = record(&d);
        d.raw_insert("hp", 2);
        d.raw_insert("hp", 3);
        assert!(d.publish_key(&"hp"));
        d.raw_insert("mp", 9);
        assert!(d.publish_key(&"mp"));
        assert_eq!(
            *events.borrow(),
            vec![
                (ChangeKind::Publish, Some("hp"), Some(1), Some(3)),
                (ChangeKind::Publish, Some("mp"), None, Some(9)),
            ]
        );
    }

    #[test]
    fn raw_remove_then_publish_reports_removed() {
        let d = dict();
        d.raw_insert("hp", 1);
        d.publish_key(&"hp");
        let events = record(&d);
        d.raw_remove(&"hp");
        assert!(d.publish_key(&"hp"));
        assert!(!d.publish_key(&"hp"));
        assert_eq!(
            *events.borrow(),
            vec![(ChangeKind::Publish, Some("hp"), Some(1), None)]
        );
    }

    #[test]
    fn key_handle_filters_other_keys() {
        let d = dict();
        d.raw_extend([("hp", 1), ("mp", 2)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        d.key_handle(&"hp")
            .unwrap()
            .subscribe_with(SubscribeOptions::new().notify_immediately(), move |p| {
                s.borrow_mut()
                    .push((p.old::<i32>().copied(), p.new::<i32>().copied()));
            });
        d.insert("mp", 5);
        d.insert("hp", 4);
        assert_eq!(*seen.borrow(), vec![(Some(1), Some(1)), (Some(1), Some(4))]);
    }

    #[test]
    fn key_events_bubble_to_dictionary_handle() {
        let d = dict();
        d.key_handle(&"hp").unwrap();
        let events = record(&d);
        d.insert("hp", 1);
        assert_eq!(
            *events.borrow(),
            vec![(ChangeKind::Add, Some("hp"), None, Some(1))]
        );
    }

    #[test]
    fn whole_publish_carries_snapshot() {
        let d = dict();
        d.raw_insert("a", 1);
        let seen = Rc::new(RefCell::new(0usize));
        let s = Rc::clone(&seen);
        d.subscribe(move |p| {
            *s.borrow_mut() = p.new::<AHashMap<&'static str, i32>>().map_or(0, |m| m.len());
        });
        d.publish();
        assert_eq!(*seen.borrow(), 1);
    }
}
