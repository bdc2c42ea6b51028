#![forbid(unsafe_code)]

//! Observable list.
//!
//! [`BindableList`] wraps a `Vec` and reports every structural mutation as one
//! notification on the list's bindings.
//!
//! | Operation | Kind | Member | Old / New |
//! |-----------|------|--------|-----------|
//! | `set` | `Replace` | `Index(i)` | previous, new |
//! | `push`, `insert` | `Add` | `Index(i)` | none, new |
//! | `remove`, `remove_at` | `Remove` | `Index(i)` | removed, none |
//! | `remove_range` | `RemoveRange` | `All` | none, none |
//! | `add_range` | `AddRange` | `All` | none, none |
//! | `clear` | `Clear` | `All` | none, none |
//! | `publish_at` | `Publish` | `Index(i)` | pending-or-current, current |
//!
//! Index events go to the index's own handle when one was requested (and
//! bubble to the list handle from there), otherwise straight to the list
//! handle. Index handles are positional: after an insert or removal they
//! address whatever element now sits at that position.
//!
//! Every mutator has a `raw_` twin that changes the contents and element
//! links without notifying. Single-element raw changes remember the index's
//! value from before the first unpublished change, so `publish_at` afterwards
//! reports the same old/new a notifying mutator would have. Bulk raw changes
//! shift every position and reset that record; follow them with
//! [`publish`](bindkit_core::Bindable::publish) for the whole list.

use std::cell::RefCell;

use ahash::AHashMap;
use bindkit_core::{
    BindError, Bindable, Bindings, Change, ChangeKind, Dispatcher, MemberKey, Value, value,
};

use crate::link::{Linkable, Linker, linker};

/// A `Vec` whose mutations are observable.
pub struct BindableList<T> {
    bindings: Bindings,
    items: RefCell<Vec<T>>,
    /// Pre-change element per index touched by raw mutators; `None` when the
    /// slot did not exist.
    pending: RefCell<AHashMap<usize, Option<T>>>,
    linker: Option<Linker<T>>,
}

impl<T: Clone + 'static> Default for BindableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> BindableList<T> {
    /// Create an empty list in the thread's default dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::in_dispatcher(&Dispatcher::current())
    }

    /// Create an empty list in `dispatcher`.
    #[must_use]
    pub fn in_dispatcher(dispatcher: &Dispatcher) -> Self {
        Self::build(dispatcher, None)
    }

    fn build(dispatcher: &Dispatcher, linker: Option<Linker<T>>) -> Self {
        Self {
            bindings: Bindings::in_dispatcher(dispatcher),
            items: RefCell::new(Vec::new()),
            pending: RefCell::new(AHashMap::new()),
            linker,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Clone the element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.borrow().get(index).cloned()
    }

    /// Borrow the elements.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.items.borrow())
    }

    /// Clone the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    // ── Notifying mutators ──────────────────────────────────────────────

    /// Replace the element at `index`, returning the previous one.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if `index >= len`.
    pub fn set(&self, index: usize, item: T) -> Result<T, BindError> {
        let old = self.raw_set_inner(index, item.clone())?;
        self.pending.borrow_mut().remove(&index);
        self.emit(Change::replaced(old.clone(), item).with_member(MemberKey::Index(index)));
        Ok(old)
    }

    /// Append an element.
    pub fn push(&self, item: T) {
        let index = self.raw_insert_inner(None, item.clone());
        self.pending.borrow_mut().remove(&index);
        self.emit(Change::added(item).with_member(MemberKey::Index(index)));
    }

    /// Insert an element at `index`, shifting later elements.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if `index > len`.
    pub fn insert(&self, index: usize, item: T) -> Result<(), BindError> {
        self.check_insert(index)?;
        self.raw_insert_inner(Some(index), item.clone());
        self.pending.borrow_mut().remove(&index);
        self.emit(Change::added(item).with_member(MemberKey::Index(index)));
        Ok(())
    }

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if `index >= len`.
    pub fn remove_at(&self, index: usize) -> Result<T, BindError> {
        let old = self.raw_remove_inner(index)?;
        self.pending.borrow_mut().remove(&index);
        self.emit(Change::removed(old.clone()).with_member(MemberKey::Index(index)));
        Ok(old)
    }

    /// Remove `count` elements starting at `start` with one `RemoveRange`
    /// notification.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if the range runs past the end.
    pub fn remove_range(&self, start: usize, count: usize) -> Result<Vec<T>, BindError> {
        let removed = self.raw_remove_range_inner(start, count)?;
        self.pending.borrow_mut().clear();
        self.emit(Change::new(ChangeKind::RemoveRange));
        Ok(removed)
    }

    /// Append every element with one `AddRange` notification.
    pub fn add_range(&self, items: impl IntoIterator<Item = T>) {
        self.raw_add_range_inner(items);
        self.pending.borrow_mut().clear();
        self.emit(Change::new(ChangeKind::AddRange));
    }

    /// Remove every element with one `Clear` notification.
    pub fn clear(&self) {
        self.raw_clear_inner();
        self.pending.borrow_mut().clear();
        self.emit(Change::new(ChangeKind::Clear));
    }

    /// Re-publish the element at `index` as `(old, current)`, where old is
    /// the value from before any unpublished raw change.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if there is neither an element nor a
    /// pending raw change at `index`.
    pub fn publish_at(&self, index: usize) -> Result<(), BindError> {
        let pending = self.pending.borrow_mut().remove(&index);
        let current = self.get(index);
        let old = match pending {
            Some(old) => old,
            None if current.is_some() => current.clone(),
            None => {
                return Err(BindError::IndexOutOfRange {
                    index,
                    len: self.len(),
                });
            }
        };
        self.emit(Change {
            kind: ChangeKind::Publish,
            member: Some(MemberKey::Index(index)),
            old: old.map(value),
            new: current.map(value),
        });
        Ok(())
    }

    // ── Raw mutators ────────────────────────────────────────────────────

    /// [`set`](Self::set) without notifying.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if `index >= len`.
    pub fn raw_set(&self, index: usize, item: T) -> Result<T, BindError> {
        let old = self.raw_set_inner(index, item)?;
        self.remember(index, Some(old.clone()));
        Ok(old)
    }

    /// [`push`](Self::push) without notifying.
    pub fn raw_push(&self, item: T) {
        let index = self.raw_insert_inner(None, item);
        self.remember(index, None);
    }

    /// [`insert`](Self::insert) without notifying.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if `index > len`.
    pub fn raw_insert(&self, index: usize, item: T) -> Result<(), BindError> {
        self.check_insert(index)?;
        self.raw_insert_inner(Some(index), item);
        self.remember(index, None);
        Ok(())
    }

    /// [`remove_at`](Self::remove_at) without notifying.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if `index >= len`.
    pub fn raw_remove_at(&self, index: usize) -> Result<T, BindError> {
        let old = self.raw_remove_inner(index)?;
        self.remember(index, Some(old.clone()));
        Ok(old)
    }

    /// [`remove_range`](Self::remove_range) without notifying.
    ///
    /// # Errors
    ///
    /// [`BindError::IndexOutOfRange`] if the range runs past the end.
    pub fn raw_remove_range(&self, start: usize, count: usize) -> Result<Vec<T>, BindError> {
        let removed = self.raw_remove_range_inner(start, count)?;
        self.pending.borrow_mut().clear();
        Ok(removed)
    }

    /// [`add_range`](Self::add_range) without notifying.
    pub fn raw_add_range(&self, items: impl IntoIterator<Item = T>) {
        self.raw_add_range_inner(items);
        self.pending.borrow_mut().clear();
    }

    /// [`clear`](Self::clear) without notifying.
    pub fn raw_clear(&self) {
        self.raw_clear_inner();
        self.pending.borrow_mut().clear();
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn remember(&self, index: usize, old: Option<T>) {
        self.pending.borrow_mut().entry(index).or_insert(old);
    }

    fn check_insert(&self, index: usize) -> Result<(), BindError> {
        let len = self.len();
        if index > len {
            return Err(BindError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn attach(&self, item: &T) {
        if let Some(link) = self.linker {
            link(item, Some(&self.bindings.all_members()));
        }
    }

    fn detach_item(&self, item: &T) {
        if let Some(link) = self.linker {
            link(item, None);
        }
    }

    fn raw_set_inner(&self, index: usize, item: T) -> Result<T, BindError> {
        let old = {
            let mut items = self.items.borrow_mut();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(BindError::IndexOutOfRange { index, len })?;
            std::mem::replace(slot, item.clone())
        };
        self.detach_item(&old);
        self.attach(&item);
        Ok(old)
    }

    /// Insert at `index`, or append when `None`; returns the final index.
    fn raw_insert_inner(&self, index: Option<usize>, item: T) -> usize {
        self.attach(&item);
        let mut items = self.items.borrow_mut();
        match index {
            Some(index) => {
                items.insert(index, item);
                index
            }
            None => {
                items.push(item);
                items.len() - 1
            }
        }
    }

    fn raw_remove_inner(&self, index: usize) -> Result<T, BindError> {
        let old = {
            let mut items = self.items.borrow_mut();
            let len = items.len();
            if index >= len {
                return Err(BindError::IndexOutOfRange { index, len });
            }
            items.remove(index)
        };
        self.detach_item(&old);
        Ok(old)
    }

    fn raw_remove_range_inner(&self, start: usize, count: usize) -> Result<Vec<T>, BindError> {
        let removed: Vec<T> = {
            let mut items = self.items.borrow_mut();
            let len = items.len();
            let end = start
                .checked_add(count)
                .filter(|end| *end <= len)
                .ok_or(BindError::IndexOutOfRange {
                    index: start.saturating_add(count),
                    len,
                })?;
            items.drain(start..end).collect()
        };
        for item in &removed {
            self.detach_item(item);
        }
        Ok(removed)
    }

    fn raw_add_range_inner(&self, items: impl IntoIterator<Item = T>) {
        let added: Vec<T> = items.into_iter().collect();
        for item in &added {
            self.attach(item);
        }
        self.items.borrow_mut().extend(added);
    }

    fn raw_clear_inner(&self) -> Vec<T> {
        let removed = std::mem::take(&mut *self.items.borrow_mut());
        for item in &removed {
            self.detach_item(item);
        }
        removed
    }

    fn emit(&self, change: Change) {
        tracing::trace!(kind = ?change.kind, len = self.len(), "list change");
        self.bindings.publish_change(change);
    }
}

impl<T: Clone + Linkable + 'static> BindableList<T> {
    /// Create an empty list that links added elements to itself.
    #[must_use]
    pub fn new_linked() -> Self {
        Self::linked_in(&Dispatcher::current())
    }

    /// Create an empty linking list in `dispatcher`.
    #[must_use]
    pub fn linked_in(dispatcher: &Dispatcher) -> Self {
        Self::build(dispatcher, linker::<T>())
    }
}

impl<T: Clone + PartialEq + 'static> BindableList<T> {
    /// Position of the first element equal to `item`.
    #[must_use]
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.borrow().iter().position(|x| x == item)
    }

    /// Whether an element equal to `item` is present.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Remove the first element equal to `item`. Returns whether one was
    /// found.
    pub fn remove(&self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// [`remove`](Self::remove) without notifying.
    pub fn raw_remove(&self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.raw_remove_at(index).is_ok(),
            None => false,
        }
    }
}

impl<T: Clone + 'static> Bindable for BindableList<T> {
    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn member_value(&self, member: &MemberKey) -> Option<Value> {
        match member {
            MemberKey::All => Some(value(self.to_vec())),
            MemberKey::Index(i) => self.get(*i).map(value),
            _ => None,
        }
    }
}

impl<T> Drop for BindableList<T> {
    fn drop(&mut self) {
        if let Some(link) = self.linker {
            for item in self.items.get_mut().iter() {
                link(item, None);
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BindableList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindableList")
            .field("items", &*self.items.borrow())
            .finish_non_exhaustive()
    }
}
