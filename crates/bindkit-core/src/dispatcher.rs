#![forbid(unsafe_code)]

//! The dispatcher: handle arena, payload pool, and the publish loop.
//!
//! A [`Dispatcher`] scopes one notification graph. It owns every handle node
//! of the objects created in it and the bounded payload pool their publishes
//! share. Cloning a dispatcher shares the same graph.
//!
//! Each thread has a default dispatcher, configured from the environment
//! (see [`BindConfig::from_env`]); objects created with
//! [`Bindings::new`](crate::Bindings::new) live there.
//!
//! # Publish Algorithm
//!
//! ```text
//! publish(origin, change):
//!   if origin is all-members and change publishes a named member:
//!     record (first old, last new) for that member if suspended
//!   else:
//!     update origin cache; mark dirty if suspended
//!   lease payload (fails past pool capacity)
//!   tier = origin
//!   loop:
//!     snapshot tier subscribers (no borrow held while they run)
//!     run live subscribers in order (only always_notify if suspended)
//!     stop if tier suspended or payload no longer bubbling
//!     tier = parent(tier)
//!   lease dropped -> payload reset and returned
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::arena::{Callback, HandleArena, HandleNode, Subscriber, SuspendedMember};
use crate::config::BindConfig;
use crate::error::BindError;
use crate::handle::{Handle, HandleId, ObserverToken, OwnerId, SubscribeOptions};
use crate::key::MemberKey;
use crate::payload::{Change, ChangeKind, Payload, Value};
use crate::pool::{PayloadPool, PoolStats};

thread_local! {
    static CURRENT: Dispatcher = Dispatcher::with_config(BindConfig::from_env());
}

struct DispatcherInner {
    arena: RefCell<HandleArena>,
    pool: PayloadPool<Payload>,
    config: BindConfig,
    next_owner: Cell<u64>,
    next_serial: Cell<u64>,
}

/// Owner of a notification graph.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<DispatcherInner>,
}

/// What a handle absorbed while it was suspended.
#[derive(Default)]
pub(crate) struct Resumed {
    /// The suspension base, if the handle's own value was published.
    pub(crate) base: Option<Option<Value>>,
    /// Members published through an all-members handle, in first-change order.
    pub(crate) members: Vec<SuspendedMember>,
}

/// One tier's view, copied out of the arena before its subscribers run.
struct TierSnapshot {
    subscribers: Vec<(Rc<Callback>, bool, Rc<Cell<bool>>)>,
    enabled: bool,
    parent: Option<HandleId>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BindConfig::default())
    }

    /// Create a dispatcher with an explicit configuration.
    #[must_use]
    pub fn with_config(config: BindConfig) -> Self {
        Self {
            inner: Rc::new(DispatcherInner {
                arena: RefCell::new(HandleArena::default()),
                pool: PayloadPool::new(config.pool_capacity),
                config,
                next_owner: Cell::new(1),
                next_serial: Cell::new(1),
            }),
        }
    }

    /// The calling thread's default dispatcher.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    /// The configuration this dispatcher was created with.
    #[must_use]
    pub fn config(&self) -> &BindConfig {
        &self.inner.config
    }

    /// Payload pool counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Number of publishes currently on the stack.
    #[must_use]
    pub fn publish_depth(&self) -> usize {
        self.inner.pool.depth()
    }

    /// Number of live handle nodes.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.inner.arena.borrow().len()
    }

    /// Whether two dispatchers share one graph.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolve an id to a handle if its node is alive.
    #[must_use]
    pub fn handle(&self, id: HandleId) -> Option<Handle> {
        self.contains(id).then(|| Handle::new(self.clone(), id))
    }

    /// Whether the node behind `id` is alive.
    #[must_use]
    pub fn contains(&self, id: HandleId) -> bool {
        self.inner.arena.borrow().get(id).is_some()
    }

    pub(crate) fn alloc_owner(&self) -> OwnerId {
        let raw = self.inner.next_owner.get();
        self.inner.next_owner.set(raw + 1);
        OwnerId::new(raw)
    }

    pub(crate) fn insert_node(
        &self,
        owner: OwnerId,
        member: MemberKey,
        parent: Option<HandleId>,
    ) -> HandleId {
        let id = self
            .inner
            .arena
            .borrow_mut()
            .insert(HandleNode::new(owner, member, parent));
        tracing::debug!(owner = owner.id(), handle = id.index(), "handle created");
        id
    }

    pub(crate) fn remove_node(&self, id: HandleId) {
        let removed = self.inner.arena.borrow_mut().remove(id);
        if let Some(node) = &removed {
            node.deactivate_all();
            tracing::debug!(owner = node.owner.id(), member = %node.member, "handle destroyed");
        }
        // Callbacks may hold guards that re-enter the arena when dropped.
        drop(removed);
    }

    /// Report a failed operation: fatal errors panic, the rest are logged.
    pub(crate) fn escalate(&self, err: &BindError) {
        if err.is_fatal() {
            tracing::error!(error = %err, depth = self.publish_depth(), "notification cycle");
            panic!("{err}");
        }
        tracing::warn!(error = %err, "binding operation skipped");
    }

    pub(crate) fn subscribe(
        &self,
        id: HandleId,
        options: SubscribeOptions,
        current: Option<Value>,
        callback: Rc<Callback>,
    ) -> Result<ObserverToken, BindError> {
        let serial = self.inner.next_serial.get();
        self.inner.next_serial.set(serial + 1);
        let cached = {
            let mut arena = self.inner.arena.borrow_mut();
            let node = arena.get_mut(id).ok_or(BindError::StaleHandle)?;
            node.subscribers.push(Subscriber {
                serial,
                callback: Rc::clone(&callback),
                always_notify: options.always_notify,
                active: Rc::new(Cell::new(true)),
            });
            node.cached.clone()
        };
        let token = ObserverToken { handle: id, serial };

        if options.first_notify {
            self.notify_single(id, current.or(cached), &callback)?;
        }
        Ok(token)
    }

    /// Deliver `(current, current)` to one callback without bubbling.
    fn notify_single(
        &self,
        id: HandleId,
        current: Option<Value>,
        callback: &Rc<Callback>,
    ) -> Result<(), BindError> {
        let owner = self.node_owner(id).ok_or(BindError::StaleHandle)?;
        let member = self.node_member(id).unwrap_or_default();
        let mut lease = self.lease()?;
        lease
            .record_mut()
            .fill(owner, id, member, Change::republish(current));
        let payload: &Payload = &lease;
        payload.stop_propagation();
        callback(payload);
        Ok(())
    }

    pub(crate) fn unsubscribe(&self, token: ObserverToken) -> bool {
        let removed = {
            let mut arena = self.inner.arena.borrow_mut();
            let Some(node) = arena.get_mut(token.handle) else {
                return false;
            };
            let Some(pos) = node
                .subscribers
                .iter()
                .position(|s| s.serial == token.serial)
            else {
                return false;
            };
            node.subscribers.remove(pos)
        };
        removed.active.set(false);
        true
    }

    pub(crate) fn unsubscribe_all(&self, id: HandleId) {
        let removed = {
            let mut arena = self.inner.arena.borrow_mut();
            match arena.get_mut(id) {
                Some(node) => std::mem::take(&mut node.subscribers),
                None => Vec::new(),
            }
        };
        for sub in &removed {
            sub.active.set(false);
        }
    }

    pub(crate) fn subscriber_count(&self, id: HandleId) -> usize {
        self.inner
            .arena
            .borrow()
            .get(id)
            .map_or(0, |n| n.subscribers.len())
    }

    pub(crate) fn node_owner(&self, id: HandleId) -> Option<OwnerId> {
        self.inner.arena.borrow().get(id).map(|n| n.owner)
    }

    pub(crate) fn node_member(&self, id: HandleId) -> Option<MemberKey> {
        self.inner.arena.borrow().get(id).map(|n| n.member.clone())
    }

    pub(crate) fn node_parent(&self, id: HandleId) -> Option<HandleId> {
        self.inner.arena.borrow().get(id).and_then(|n| n.parent)
    }

    pub(crate) fn is_notify_enabled(&self, id: HandleId) -> bool {
        self.inner
            .arena
            .borrow()
            .get(id)
            .is_some_and(|n| n.notify_enabled)
    }

    pub(crate) fn cached(&self, id: HandleId) -> Option<Value> {
        self.inner
            .arena
            .borrow()
            .get(id)
            .and_then(|n| n.cached.clone())
    }

    pub(crate) fn store(&self, id: HandleId, value: Option<Value>) {
        if let Some(node) = self.inner.arena.borrow_mut().get_mut(id) {
            node.cached = value;
        }
    }

    pub(crate) fn set_parent(&self, id: HandleId, parent: Option<HandleId>) -> Result<(), BindError> {
        let mut arena = self.inner.arena.borrow_mut();
        if arena.get(id).is_none() {
            return Err(BindError::StaleHandle);
        }
        if let Some(parent) = parent {
            if arena.get(parent).is_none() {
                return Err(BindError::StaleHandle);
            }
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == id {
                    return Err(BindError::ParentCycle);
                }
                cursor = arena.get(current).and_then(|n| n.parent);
            }
        }
        if let Some(node) = arena.get_mut(id)
            && node.parent != parent
        {
            node.parent = parent;
            tracing::debug!(
                handle = id.index(),
                parent = parent.map(HandleId::index),
                "parent rewired"
            );
        }
        Ok(())
    }

    pub(crate) fn suspend(&self, id: HandleId, base: Option<Value>) -> Result<(), BindError> {
        let mut arena = self.inner.arena.borrow_mut();
        let node = arena.get_mut(id).ok_or(BindError::StaleHandle)?;
        if node.notify_enabled {
            node.notify_enabled = false;
            node.suspended_base = base.or_else(|| node.cached.clone());
            node.dirty = false;
            node.suspended_members.clear();
        }
        Ok(())
    }

    /// Re-enable delivery and hand back what was published meanwhile.
    pub(crate) fn resume(&self, id: HandleId) -> Result<Resumed, BindError> {
        let mut arena = self.inner.arena.borrow_mut();
        let node = arena.get_mut(id).ok_or(BindError::StaleHandle)?;
        if node.notify_enabled {
            return Ok(Resumed::default());
        }
        node.notify_enabled = true;
        let base = node.suspended_base.take();
        Ok(Resumed {
            base: std::mem::take(&mut node.dirty).then_some(base),
            members: std::mem::take(&mut node.suspended_members),
        })
    }

    fn lease(&self) -> Result<crate::pool::PoolLease<'_, Payload>, BindError> {
        self.inner.pool.acquire().inspect_err(|err| {
            tracing::error!(
                error = %err,
                capacity = self.inner.pool.capacity(),
                "payload pool exhausted"
            );
        })
    }

    fn tier_snapshot(&self, id: HandleId) -> Option<TierSnapshot> {
        let arena = self.inner.arena.borrow();
        let node = arena.get(id)?;
        Some(TierSnapshot {
            subscribers: node
                .subscribers
                .iter()
                .map(|s| (Rc::clone(&s.callback), s.always_notify, Rc::clone(&s.active)))
                .collect(),
            enabled: node.notify_enabled,
            parent: node.parent,
        })
    }

    pub(crate) fn publish(&self, origin: HandleId, change: Change) -> Result<(), BindError> {
        let (sender, member) = {
            let mut arena = self.inner.arena.borrow_mut();
            let node = arena.get_mut(origin).ok_or(BindError::StaleHandle)?;
            // A member value routed through the all-members node is not the
            // object's value: keep it out of the cache. Structural changes
            // tagged with an index or key still dirty the whole object.
            let all_node = node.member.is_all();
            let tagged = change.member.as_ref().filter(|m| all_node && !m.is_all());
            match tagged {
                Some(member) if change.kind == ChangeKind::Publish => {
                    if !node.notify_enabled {
                        node.absorb_member(member, change.old.clone(), change.new.clone());
                    }
                }
                _ => {
                    if !all_node || (tagged.is_none() && change.kind == ChangeKind::Publish) {
                        node.cached = change.new.clone();
                    }
                    if !node.notify_enabled {
                        node.dirty = true;
                    }
                }
            }
            let member = change.member.clone().unwrap_or_else(|| node.member.clone());
            (node.owner, member)
        };

        let mut lease = self.lease()?;
        lease.record_mut().fill(sender, origin, member, change);
        let payload: &Payload = &lease;

        let mut tier = Some(origin);
        while let Some(id) = tier {
            let Some(snapshot) = self.tier_snapshot(id) else {
                break;
            };
            payload.enter_tier(id);
            tracing::trace!(
                tier = id.index(),
                kind = ?payload.kind(),
                member = %payload.member(),
                subscribers = snapshot.subscribers.len(),
                "deliver"
            );
            for (callback, always_notify, active) in &snapshot.subscribers {
                if !active.get() || (!snapshot.enabled && !always_notify) {
                    continue;
                }
                callback(payload);
            }
            if !snapshot.enabled || !payload.is_bubbling() {
                break;
            }
            tier = snapshot.parent;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handles", &self.handle_count())
            .field("depth", &self.publish_depth())
            .field("config", &self.inner.config)
            .finish()
    }
}
