#![forbid(unsafe_code)]

//! Per-object handle set.
//!
//! [`Bindings`] is what a bindable object embeds: its owner identity, its
//! all-members handle, and the lazily created per-member handles. Every
//! member handle's parent is the all-members handle, so a member change also
//! reaches "any member" subscribers before bubbling to the object's parent.
//!
//! Cloning `Bindings` shares the same handle set (properties keep a clone to
//! publish through). The handles are destroyed when the last clone drops.
//!
//! # Member Resolution
//!
//! | Key | Declared names known | Result |
//! |-----|----------------------|--------|
//! | `All` | - | [`MemberResolution::AllMembers`] |
//! | `Name` listed | yes | [`MemberResolution::Declared`] |
//! | `Name` not listed | yes | [`MemberResolution::Unknown`] |
//! | `Name` | no | [`MemberResolution::Dynamic`] |
//! | `Index` / `Key` | - | [`MemberResolution::Dynamic`] |
//!
//! `Unknown` falls back to the all-members handle with a warning under
//! [`MemberLookup::Lenient`] and is rejected under [`MemberLookup::Strict`].

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::config::MemberLookup;
use crate::dispatcher::Dispatcher;
use crate::error::BindError;
use crate::handle::{Handle, HandleId, OwnerId};
use crate::key::MemberKey;
use crate::members::MemberSet;
use crate::payload::Change;

/// How a member key maps onto an object's handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberResolution {
    /// The key addresses the object as a whole.
    AllMembers,
    /// A name the object declared.
    Declared,
    /// A key the object accepts without declaration (indices, erased keys,
    /// names on objects without a declared member set).
    Dynamic,
    /// A name outside the declared member set.
    Unknown,
}

struct BindingsInner {
    dispatcher: Dispatcher,
    owner: OwnerId,
    all: HandleId,
    members: RefCell<AHashMap<MemberKey, HandleId>>,
    order: RefCell<Vec<MemberKey>>,
    declared: Option<&'static [&'static str]>,
}

impl Drop for BindingsInner {
    fn drop(&mut self) {
        let members = std::mem::take(self.members.get_mut());
        for id in members.into_values() {
            self.dispatcher.remove_node(id);
        }
        self.dispatcher.remove_node(self.all);
    }
}

/// The handle set of one bindable object.
#[derive(Clone)]
pub struct Bindings {
    inner: Rc<BindingsInner>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl Bindings {
    /// Create bindings in the thread's default dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::build(&Dispatcher::current(), None)
    }

    /// Create bindings in a specific dispatcher.
    #[must_use]
    pub fn in_dispatcher(dispatcher: &Dispatcher) -> Self {
        Self::build(dispatcher, None)
    }

    /// Create bindings that know their declared members.
    #[must_use]
    pub fn for_members<M: MemberSet>() -> Self {
        Self::build(&Dispatcher::current(), Some(M::NAMES))
    }

    /// Create bindings with declared members in a specific dispatcher.
    #[must_use]
    pub fn for_members_in<M: MemberSet>(dispatcher: &Dispatcher) -> Self {
        Self::build(dispatcher, Some(M::NAMES))
    }

    fn build(dispatcher: &Dispatcher, declared: Option<&'static [&'static str]>) -> Self {
        let owner = dispatcher.alloc_owner();
        let all = dispatcher.insert_node(owner, MemberKey::All, None);
        Self {
            inner: Rc::new(BindingsInner {
                dispatcher: dispatcher.clone(),
                owner,
                all,
                members: RefCell::new(AHashMap::new()),
                order: RefCell::new(Vec::new()),
                declared,
            }),
        }
    }

    /// Identity of the owning object.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.inner.owner
    }

    /// The dispatcher the handles live in.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// The all-members handle.
    #[must_use]
    pub fn all_members(&self) -> Handle {
        Handle::new(self.inner.dispatcher.clone(), self.inner.all)
    }

    /// Declared member names, if any were given.
    #[must_use]
    pub fn declared_members(&self) -> Option<&'static [&'static str]> {
        self.inner.declared
    }

    /// Classify a member key.
    #[must_use]
    pub fn resolve(&self, member: &MemberKey) -> MemberResolution {
        match member {
            MemberKey::All => MemberResolution::AllMembers,
            MemberKey::Name(name) => match self.inner.declared {
                Some(names) if names.contains(&name.as_ref()) => MemberResolution::Declared,
                Some(_) => MemberResolution::Unknown,
                None => MemberResolution::Dynamic,
            },
            MemberKey::Index(_) | MemberKey::Key(_) => MemberResolution::Dynamic,
        }
    }

    /// Fetch or create the handle for `member`.
    ///
    /// # Errors
    ///
    /// [`BindError::UnknownMember`] for an undeclared name under strict lookup.
    pub fn handle(&self, member: impl Into<MemberKey>) -> Result<Handle, BindError> {
        self.handle_entry(member.into()).map(|(handle, _)| handle)
    }

    /// Like [`handle`](Self::handle), also reporting whether the node was
    /// created by this call.
    pub(crate) fn handle_entry(&self, member: MemberKey) -> Result<(Handle, bool), BindError> {
        match self.resolve(&member) {
            MemberResolution::AllMembers => return Ok((self.all_members(), false)),
            MemberResolution::Unknown => {
                return match self.inner.dispatcher.config().member_lookup {
                    MemberLookup::Strict => {
                        tracing::warn!(owner = self.owner().id(), member = %member, "unknown member rejected");
                        Err(BindError::UnknownMember {
                            member: member.to_string(),
                        })
                    }
                    MemberLookup::Lenient => {
                        tracing::warn!(
                            owner = self.owner().id(),
                            member = %member,
                            "unknown member; falling back to all-members handle"
                        );
                        Ok((self.all_members(), false))
                    }
                };
            }
            MemberResolution::Declared | MemberResolution::Dynamic => {}
        }

        if let Some(id) = self.inner.members.borrow().get(&member) {
            return Ok((Handle::new(self.inner.dispatcher.clone(), *id), false));
        }
        let id = self
            .inner
            .dispatcher
            .insert_node(self.inner.owner, member.clone(), Some(self.inner.all));
        self.inner.members.borrow_mut().insert(member.clone(), id);
        self.inner.order.borrow_mut().push(member);
        Ok((Handle::new(self.inner.dispatcher.clone(), id), true))
    }

    /// The handle for `member` if one has been created.
    #[must_use]
    pub fn existing_handle(&self, member: &MemberKey) -> Option<Handle> {
        if member.is_all() {
            return Some(self.all_members());
        }
        self.inner
            .members
            .borrow()
            .get(member)
            .map(|id| Handle::new(self.inner.dispatcher.clone(), *id))
    }

    /// Drop the dedicated handle of `member`, if any. Later publishes of the
    /// member go to the all-members handle.
    pub fn release_handle(&self, member: &MemberKey) -> bool {
        let removed = self.inner.members.borrow_mut().remove(member);
        match removed {
            Some(id) => {
                self.inner.order.borrow_mut().retain(|k| k != member);
                self.inner.dispatcher.remove_node(id);
                true
            }
            None => false,
        }
    }

    /// Every handle: members in creation order, then the all-members handle.
    #[must_use]
    pub fn handles(&self) -> Vec<(MemberKey, Handle)> {
        let members = self.inner.members.borrow();
        let mut out: Vec<(MemberKey, Handle)> = self
            .inner
            .order
            .borrow()
            .iter()
            .filter_map(|key| {
                members
                    .get(key)
                    .map(|id| (key.clone(), Handle::new(self.inner.dispatcher.clone(), *id)))
            })
            .collect();
        out.push((MemberKey::All, self.all_members()));
        out
    }

    /// Publish a change, routed to the member's own handle when it exists and
    /// to the all-members handle otherwise.
    ///
    /// # Panics
    ///
    /// Panics if the publish depth is exhausted.
    pub fn publish_change(&self, change: Change) {
        if let Err(err) = self.try_publish_change(change) {
            self.inner.dispatcher.escalate(&err);
        }
    }

    /// Routed publish, reporting failures.
    ///
    /// # Errors
    ///
    /// [`BindError::PoolExhausted`] past the nesting bound.
    pub fn try_publish_change(&self, mut change: Change) -> Result<(), BindError> {
        if let Some(member) = change.member.as_ref()
            && let Some(handle) = self.existing_handle(member)
            && !member.is_all()
        {
            change.member = None;
            return handle.try_publish_change(change);
        }
        self.all_members().try_publish_change(change)
    }

    /// Point the all-members handle at `parent`.
    ///
    /// # Errors
    ///
    /// [`BindError::ForeignHandle`], [`BindError::StaleHandle`], or
    /// [`BindError::ParentCycle`].
    pub fn set_parent(&self, parent: Option<&Handle>) -> Result<(), BindError> {
        self.all_members().set_parent(parent)
    }

    /// Current parent of the all-members handle.
    #[must_use]
    pub fn parent(&self) -> Option<HandleId> {
        self.all_members().parent()
    }

    /// Whether the all-members handle delivers notifications.
    #[must_use]
    pub fn is_notify_enabled(&self) -> bool {
        self.all_members().is_notify_enabled()
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bindings")
            .field("owner", &self.inner.owner)
            .field("members", &self.inner.order.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindConfig;

    crate::bindable_members! {
        enum Stat {
            Health => "health",
            Mana => "mana",
        }
    }

    #[test]
    fn member_handles_are_created_once() {
        let d = Dispatcher::new();
        let b = Bindings::in_dispatcher(&d);
        let first = b.handle("hp").unwrap();
        let second = b.handle("hp").unwrap();
        assert_eq!(first, second);
        assert_eq!(d.handle_count(), 2);
        assert_eq!(first.parent(), Some(b.all_members().id()));
    }

    #[test]
    fn all_key_returns_all_members_handle() {
        let b = Bindings::in_dispatcher(&Dispatcher::new());
        assert_eq!(b.handle(MemberKey::All).unwrap(), b.all_members());
    }

    #[test]
    fn declared_names_resolve() {
        let b = Bindings::for_members_in::<Stat>(&Dispatcher::new());
        assert_eq!(b.resolve(&Stat::Health.into()), MemberResolution::Declared);
        assert_eq!(b.resolve(&"armor".into()), MemberResolution::Unknown);
        assert_eq!(b.resolve(&MemberKey::Index(0)), MemberResolution::Dynamic);
        assert_eq!(b.resolve(&MemberKey::All), MemberResolution::AllMembers);
    }

    #[test]
    fn unknown_member_falls_back_when_lenient() {
        let b = Bindings::for_members_in::<Stat>(&Dispatcher::new());
        assert_eq!(b.handle("armor").unwrap(), b.all_members());
    }

    #[test]
    fn unknown_member_rejected_when_strict() {
        let d = Dispatcher::with_config(BindConfig::new().with_member_lookup(MemberLookup::Strict));
        let b = Bindings::for_members_in::<Stat>(&d);
        assert_eq!(
            b.handle("armor").unwrap_err(),
            BindError::UnknownMember {
                member: "armor".into()
            }
        );
        assert!(b.handle(Stat::Mana).is_ok());
    }

    #[test]
    fn handles_listed_in_creation_order() {
        let b = Bindings::in_dispatcher(&Dispatcher::new());
        b.handle("b").unwrap();
        b.handle("a").unwrap();
        let keys: Vec<MemberKey> = b.handles().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b".into(), "a".into(), MemberKey::All]);
    }

    #[test]
    fn dropping_bindings_destroys_handles() {
        let d = Dispatcher::new();
        let member = {
            let b = Bindings::in_dispatcher(&d);
            let member = b.handle("hp").unwrap();
            assert_eq!(d.handle_count(), 2);
            member
        };
        assert_eq!(d.handle_count(), 0);
        assert!(!member.is_alive());
    }

    #[test]
    fn clones_share_handles() {
        let d = Dispatcher::new();
        let b = Bindings::in_dispatcher(&d);
        let c = b.clone();
        drop(b);
        assert_eq!(d.handle_count(), 1);
        assert!(c.all_members().is_alive());
    }

    #[test]
    fn release_handle_routes_back_to_all() {
        let d = Dispatcher::new();
        let b = Bindings::in_dispatcher(&d);
        b.handle("hp").unwrap();
        assert!(b.release_handle(&"hp".into()));
        assert!(b.existing_handle(&"hp".into()).is_none());
        assert_eq!(d.handle_count(), 1);
        assert!(!b.release_handle(&"hp".into()));
    }

    #[test]
    fn owners_are_distinct() {
        let d = Dispatcher::new();
        let a = Bindings::in_dispatcher(&d);
        let b = Bindings::in_dispatcher(&d);
        assert_ne!(a.owner(), b.owner());
    }
}
