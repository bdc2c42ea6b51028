#![forbid(unsafe_code)]

//! Notification payloads.
//!
//! A [`Payload`] is the record handed to every subscriber during one publish
//! call. Payloads are pooled (see [`pool`](crate::pool)) and only borrowed by
//! subscribers; a subscriber that needs to keep the data past the call takes a
//! [`Notification`] snapshot.
//!
//! Values are type-erased as [`Value`] (`Rc<dyn Any>`) so one payload type
//! can travel through handles of differently-typed members and bubble into
//! parents that know nothing about the child's member types. Typed access
//! goes through [`Payload::old`] / [`Payload::new`].
//!
//! A publish request is described by a [`Change`]: the change kind, an
//! optional member override, and the old/new values.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use crate::handle::{HandleId, OwnerId};
use crate::key::MemberKey;
use crate::pool::Poolable;

/// A type-erased value carried by a payload.
pub type Value = Rc<dyn Any>;

/// Wrap a value for a payload.
#[must_use]
pub fn value<T: Any>(v: T) -> Value {
    Rc::new(v)
}

/// The structural category of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeKind {
    /// A member value was published (property set or explicit re-publish).
    #[default]
    Publish,
    /// An element was added.
    Add,
    /// An element was removed.
    Remove,
    /// A contiguous range (or batch of keys) was removed.
    RemoveRange,
    /// An existing element was replaced.
    Replace,
    /// The container was cleared.
    Clear,
    /// A batch of elements was added.
    AddRange,
}

impl ChangeKind {
    /// Whether this kind describes a bulk operation without per-element values.
    #[must_use]
    pub const fn is_bulk(self) -> bool {
        matches!(self, Self::RemoveRange | Self::AddRange | Self::Clear)
    }
}

/// A publish request.
#[derive(Debug, Clone, Default)]
pub struct Change {
    /// Change kind.
    pub kind: ChangeKind,
    /// Member reported to subscribers; `None` reports the publishing handle's own member.
    pub member: Option<MemberKey>,
    /// Value before the change.
    pub old: Option<Value>,
    /// Value after the change.
    pub new: Option<Value>,
}

impl Change {
    /// An empty change of the given kind.
    #[must_use]
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// A value change `(old, new)` of kind [`ChangeKind::Publish`].
    #[must_use]
    pub fn value<T: Any>(old: T, new: T) -> Self {
        Self::new(ChangeKind::Publish)
            .with_old(value(old))
            .with_new(value(new))
    }

    /// A re-publish of `current` as both old and new.
    #[must_use]
    pub fn republish(current: Option<Value>) -> Self {
        Self {
            kind: ChangeKind::Publish,
            member: None,
            old: current.clone(),
            new: current,
        }
    }

    /// An element replacement.
    #[must_use]
    pub fn replaced<T: Any>(old: T, new: T) -> Self {
        Self::new(ChangeKind::Replace)
            .with_old(value(old))
            .with_new(value(new))
    }

    /// An element addition.
    #[must_use]
    pub fn added<T: Any>(new: T) -> Self {
        Self::new(ChangeKind::Add).with_new(value(new))
    }

    /// An element removal.
    #[must_use]
    pub fn removed<T: Any>(old: T) -> Self {
        Self::new(ChangeKind::Remove).with_old(value(old))
    }

    /// Report `member` instead of the publishing handle's member.
    #[must_use]
    pub fn with_member(mut self, member: MemberKey) -> Self {
        self.member = Some(member);
        self
    }

    /// Set the old value.
    #[must_use]
    pub fn with_old(mut self, old: Value) -> Self {
        self.old = Some(old);
        self
    }

    /// Set the new value.
    #[must_use]
    pub fn with_new(mut self, new: Value) -> Self {
        self.new = Some(new);
        self
    }
}

/// The pooled record delivered to subscribers.
///
/// Subscribers receive `&Payload`; the only mutation available to them is
/// [`stop_propagation`](Self::stop_propagation).
#[derive(Debug)]
pub struct Payload {
    sender: OwnerId,
    member: MemberKey,
    old: Option<Value>,
    new: Option<Value>,
    kind: ChangeKind,
    bubble: Cell<bool>,
    origin: Option<HandleId>,
    tier: Cell<Option<HandleId>>,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            sender: OwnerId::NONE,
            member: MemberKey::All,
            old: None,
            new: None,
            kind: ChangeKind::Publish,
            bubble: Cell::new(true),
            origin: None,
            tier: Cell::new(None),
        }
    }
}

impl Poolable for Payload {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Payload {
    pub(crate) fn fill(&mut self, sender: OwnerId, origin: HandleId, member: MemberKey, change: Change) {
        self.sender = sender;
        self.member = member;
        self.old = change.old;
        self.new = change.new;
        self.kind = change.kind;
        self.bubble.set(true);
        self.origin = Some(origin);
        self.tier.set(Some(origin));
    }

    pub(crate) fn enter_tier(&self, tier: HandleId) {
        self.tier.set(Some(tier));
    }

    /// Owner of the handle the change was published on.
    #[must_use]
    pub fn sender(&self) -> OwnerId {
        self.sender
    }

    /// The member that changed.
    #[must_use]
    pub fn member(&self) -> &MemberKey {
        &self.member
    }

    /// The change kind.
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// The old value, if present and of type `T`.
    #[must_use]
    pub fn old<T: Any>(&self) -> Option<&T> {
        self.old.as_deref().and_then(|v| v.downcast_ref())
    }

    /// The new value, if present and of type `T`.
    #[must_use]
    pub fn new<T: Any>(&self) -> Option<&T> {
        self.new.as_deref().and_then(|v| v.downcast_ref())
    }

    /// The erased old value.
    #[must_use]
    pub fn old_value(&self) -> Option<&Value> {
        self.old.as_ref()
    }

    /// The erased new value.
    #[must_use]
    pub fn new_value(&self) -> Option<&Value> {
        self.new.as_ref()
    }

    /// The handle the change was published on.
    #[must_use]
    pub fn origin(&self) -> Option<HandleId> {
        self.origin
    }

    /// The handle whose subscribers are currently running.
    #[must_use]
    pub fn tier(&self) -> Option<HandleId> {
        self.tier.get()
    }

    /// Whether the payload was forwarded from a descendant handle.
    #[must_use]
    pub fn is_bubbled(&self) -> bool {
        self.origin.is_some() && self.origin != self.tier.get()
    }

    /// Whether the payload will continue to the parent tier.
    #[must_use]
    pub fn is_bubbling(&self) -> bool {
        self.bubble.get()
    }

    /// Keep the payload from reaching the parent tier.
    ///
    /// The remaining subscribers of the current tier still run.
    pub fn stop_propagation(&self) {
        self.bubble.set(false);
    }

    /// Take an owned snapshot that may outlive the publish call.
    #[must_use]
    pub fn to_notification(&self) -> Notification {
        Notification {
            sender: self.sender,
            member: self.member.clone(),
            old: self.old.clone(),
            new: self.new.clone(),
            kind: self.kind,
            origin: self.origin,
        }
    }
}

/// An owned copy of a payload.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Owner of the originating handle.
    pub sender: OwnerId,
    /// The member that changed.
    pub member: MemberKey,
    /// Value before the change.
    pub old: Option<Value>,
    /// Value after the change.
    pub new: Option<Value>,
    /// Change kind.
    pub kind: ChangeKind,
    /// The handle the change was published on.
    pub origin: Option<HandleId>,
}

impl Notification {
    /// The old value, if present and of type `T`.
    #[must_use]
    pub fn old<T: Any>(&self) -> Option<&T> {
        self.old.as_deref().and_then(|v| v.downcast_ref())
    }

    /// The new value, if present and of type `T`.
    #[must_use]
    pub fn new<T: Any>(&self) -> Option<&T> {
        self.new.as_deref().and_then(|v| v.downcast_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_checks_type() {
        let mut payload = Payload::default();
        payload.fill(
            OwnerId::NONE,
            HandleId::new(0, 0),
            MemberKey::from("hp"),
            Change::value(3i32, 7i32),
        );
        assert_eq!(payload.old::<i32>(), Some(&3));
        assert_eq!(payload.new::<i32>(), Some(&7));
        assert_eq!(payload.new::<u32>(), None);
        assert_eq!(payload.member(), &MemberKey::from("hp"));
    }

    #[test]
    fn stop_propagation_clears_bubble() {
        let payload = Payload::default();
        assert!(payload.is_bubbling());
        payload.stop_propagation();
        assert!(!payload.is_bubbling());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut payload = Payload::default();
        payload.fill(
            OwnerId::NONE,
            HandleId::new(1, 0),
            MemberKey::Index(2),
            Change::added("x"),
        );
        payload.stop_propagation();
        payload.reset();
        assert!(payload.is_bubbling());
        assert_eq!(payload.kind(), ChangeKind::Publish);
        assert!(payload.new_value().is_none());
        assert!(payload.origin().is_none());
    }

    #[test]
    fn notification_outlives_payload() {
        let mut payload = Payload::default();
        payload.fill(
            OwnerId::NONE,
            HandleId::new(0, 0),
            MemberKey::All,
            Change::removed(String::from("gone")),
        );
        let snapshot = payload.to_notification();
        payload.reset();
        assert_eq!(snapshot.kind, ChangeKind::Remove);
        assert_eq!(snapshot.old::<String>().map(String::as_str), Some("gone"));
        assert!(snapshot.new::<String>().is_none());
    }

    #[test]
    fn bulk_kinds() {
        assert!(ChangeKind::Clear.is_bulk());
        assert!(ChangeKind::AddRange.is_bulk());
        assert!(!ChangeKind::Replace.is_bulk());
    }
}
