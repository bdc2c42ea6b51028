#![forbid(unsafe_code)]

//! Handles: the notification nodes subscribers attach to.
//!
//! A [`Handle`] is a cheap, clonable reference to one node of a dispatcher's
//! handle arena. Each bindable object owns one all-members node plus one node
//! per member that has been asked for. Handles form a tree through
//! non-owning parent edges; a publish runs the subscribers of its own node,
//! then walks up the parents while the payload keeps bubbling.
//!
//! # Invariants
//!
//! 1. Subscribers of one node run in subscription order.
//! 2. The bubble decision for a tier is taken after every subscriber of that
//!    tier has run; one `stop_propagation()` anywhere in the tier stops it.
//! 3. A suspended node runs only `always_notify` subscribers and does not
//!    forward to its parent.
//! 4. Parent edges never form a cycle.
//! 5. A `Handle` whose owner was dropped is stale: publishes are skipped and
//!    subscriptions are rejected with a warning.
//!
//! # Failure Modes
//!
//! - Publishing deeper than the pool capacity: `try_*` methods return
//!   [`BindError::PoolExhausted`]; the plain methods log and panic.
//! - Subscriber panic: the pooled payload is released during unwinding and
//!   the panic reaches the caller of the mutating method.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::dispatcher::Dispatcher;
use crate::error::BindError;
use crate::key::MemberKey;
use crate::payload::{Change, Payload, Value};

/// Index of a node in a dispatcher's handle arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

impl HandleId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation at creation time.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Identity of a bindable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Placeholder for records not yet filled.
    pub const NONE: Self = Self(0);

    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Identifies one subscription; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken {
    pub(crate) handle: HandleId,
    pub(crate) serial: u64,
}

impl ObserverToken {
    /// The handle the subscription is attached to.
    #[must_use]
    pub const fn handle(self) -> HandleId {
        self.handle
    }
}

/// Subscription flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Invoke the callback once, immediately, with the current value as both
    /// old and new.
    pub first_notify: bool,
    /// Keep delivering while the handle's notifications are suspended.
    pub always_notify: bool,
}

impl SubscribeOptions {
    /// No flags.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            first_notify: false,
            always_notify: false,
        }
    }

    /// Set [`first_notify`](Self::first_notify).
    #[must_use]
    pub const fn notify_immediately(mut self) -> Self {
        self.first_notify = true;
        self
    }

    /// Set [`always_notify`](Self::always_notify).
    #[must_use]
    pub const fn notify_always(mut self) -> Self {
        self.always_notify = true;
        self
    }
}

/// Reference to one notification node.
#[derive(Clone)]
pub struct Handle {
    dispatcher: Dispatcher,
    id: HandleId,
}

impl Handle {
    pub(crate) fn new(dispatcher: Dispatcher, id: HandleId) -> Self {
        Self { dispatcher, id }
    }

    /// Arena id of this node.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The dispatcher owning the node.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Whether the owner is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.dispatcher.contains(self.id)
    }

    /// Owner of the node.
    #[must_use]
    pub fn owner(&self) -> Option<OwnerId> {
        self.dispatcher.node_owner(self.id)
    }

    /// Member the node stands for.
    #[must_use]
    pub fn member(&self) -> Option<MemberKey> {
        self.dispatcher.node_member(self.id)
    }

    /// Subscribe with default options.
    pub fn subscribe(&self, callback: impl Fn(&Payload) + 'static) -> ObserverToken {
        self.subscribe_with(SubscribeOptions::new(), callback)
    }

    /// Subscribe with explicit options.
    ///
    /// # Panics
    ///
    /// Panics if `first_notify` is set and the publish depth is exhausted.
    pub fn subscribe_with(
        &self,
        options: SubscribeOptions,
        callback: impl Fn(&Payload) + 'static,
    ) -> ObserverToken {
        self.try_subscribe_with(options, callback)
            .unwrap_or_else(|err| {
                self.dispatcher.escalate(&err);
                ObserverToken {
                    handle: self.id,
                    serial: 0,
                }
            })
    }

    /// Subscribe, reporting failures.
    ///
    /// # Errors
    ///
    /// [`BindError::StaleHandle`] for a dropped owner; [`BindError::PoolExhausted`]
    /// if the first notification cannot lease a payload.
    pub fn try_subscribe_with(
        &self,
        options: SubscribeOptions,
        callback: impl Fn(&Payload) + 'static,
    ) -> Result<ObserverToken, BindError> {
        self.subscribe_seeded(options, None, Rc::new(callback))
    }

    /// Subscribe with an explicit current value for the first notification.
    pub(crate) fn subscribe_seeded(
        &self,
        options: SubscribeOptions,
        current: Option<Value>,
        callback: Rc<dyn Fn(&Payload)>,
    ) -> Result<ObserverToken, BindError> {
        self.dispatcher
            .subscribe(self.id, options, current, callback)
    }

    /// Subscribe for as long as the returned guard lives.
    pub fn subscribe_scoped(
        &self,
        options: SubscribeOptions,
        callback: impl Fn(&Payload) + 'static,
    ) -> Subscription {
        Subscription {
            dispatcher: self.dispatcher.clone(),
            token: Some(self.subscribe_with(options, callback)),
        }
    }

    /// Remove a subscription. Returns `false` if it was not registered here.
    pub fn unsubscribe(&self, token: ObserverToken) -> bool {
        token.handle == self.id && self.dispatcher.unsubscribe(token)
    }

    /// Remove every subscription on this node.
    pub fn unsubscribe_all(&self) {
        self.dispatcher.unsubscribe_all(self.id);
    }

    /// Number of subscriptions on this node.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.dispatcher.subscriber_count(self.id)
    }

    /// Publish a value change.
    ///
    /// # Panics
    ///
    /// Panics if the publish depth is exhausted.
    pub fn publish<T: Any>(&self, old: T, new: T) {
        self.publish_change(Change::value(old, new));
    }

    /// Publish an arbitrary change.
    ///
    /// # Panics
    ///
    /// Panics if the publish depth is exhausted.
    pub fn publish_change(&self, change: Change) {
        if let Err(err) = self.try_publish_change(change) {
            self.dispatcher.escalate(&err);
        }
    }

    /// Publish an arbitrary change, reporting failures.
    ///
    /// # Errors
    ///
    /// [`BindError::StaleHandle`] or [`BindError::PoolExhausted`].
    pub fn try_publish_change(&self, change: Change) -> Result<(), BindError> {
        self.dispatcher.publish(self.id, change)
    }

    /// Suspend or resume delivery.
    ///
    /// Suspending records the cached value as the base. Resuming with
    /// `flush` emits one `(first old, last new)` notification per member
    /// routed through this node meanwhile, then one `(base, current)`
    /// notification if the node's own value was published.
    ///
    /// # Panics
    ///
    /// Panics if the flush exhausts the publish depth.
    pub fn set_notify(&self, enabled: bool, flush: bool) {
        if let Err(err) = self.try_set_notify(enabled, flush, None) {
            self.dispatcher.escalate(&err);
        }
    }

    pub(crate) fn try_set_notify(
        &self,
        enabled: bool,
        flush: bool,
        current: Option<Value>,
    ) -> Result<(), BindError> {
        if !enabled {
            return self.dispatcher.suspend(self.id, current);
        }
        let resumed = self.dispatcher.resume(self.id)?;
        if !flush {
            return Ok(());
        }
        for entry in resumed.members {
            self.dispatcher.publish(
                self.id,
                Change {
                    member: Some(entry.member),
                    old: entry.old,
                    new: entry.new,
                    ..Change::default()
                },
            )?;
        }
        match resumed.base {
            Some(base) => self.dispatcher.publish(
                self.id,
                Change {
                    old: base,
                    new: current.or_else(|| self.cached_value()),
                    ..Change::default()
                },
            ),
            None => Ok(()),
        }
    }

    /// Whether delivery is enabled.
    #[must_use]
    pub fn is_notify_enabled(&self) -> bool {
        self.dispatcher.is_notify_enabled(self.id)
    }

    /// Point this node's bubbling edge at `parent` (or detach it).
    ///
    /// # Errors
    ///
    /// [`BindError::ForeignHandle`], [`BindError::StaleHandle`], or
    /// [`BindError::ParentCycle`].
    pub fn set_parent(&self, parent: Option<&Handle>) -> Result<(), BindError> {
        if let Some(parent) = parent
            && !parent.dispatcher.ptr_eq(&self.dispatcher)
        {
            return Err(BindError::ForeignHandle);
        }
        self.dispatcher.set_parent(self.id, parent.map(Handle::id))
    }

    /// Current parent node.
    #[must_use]
    pub fn parent(&self) -> Option<HandleId> {
        self.dispatcher.node_parent(self.id)
    }

    /// The cached value, if it has type `T`.
    #[must_use]
    pub fn value<T: Any + Clone>(&self) -> Option<T> {
        self.cached_value()
            .and_then(|v| v.downcast_ref::<T>().cloned())
    }

    /// The cached value: the last published new value, or a seeded value.
    #[must_use]
    pub fn cached_value(&self) -> Option<Value> {
        self.dispatcher.cached(self.id)
    }

    /// Replace the cached value without publishing.
    pub fn store_value(&self, value: Option<Value>) {
        self.dispatcher.store(self.id, value);
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.dispatcher.ptr_eq(&other.dispatcher)
    }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("member", &self.member())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// RAII guard for a subscription.
///
/// Dropping the guard unsubscribes the callback.
pub struct Subscription {
    dispatcher: Dispatcher,
    token: Option<ObserverToken>,
}

impl Subscription {
    /// Guard a subscription made with a token-returning call.
    #[must_use]
    pub fn adopt(dispatcher: &Dispatcher, token: ObserverToken) -> Self {
        Self {
            dispatcher: dispatcher.clone(),
            token: Some(token),
        }
    }

    /// Token of the guarded subscription.
    #[must_use]
    pub fn token(&self) -> Option<ObserverToken> {
        self.token
    }

    /// Keep the callback registered after the guard is dropped.
    pub fn forget(mut self) -> Option<ObserverToken> {
        self.token.take()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.dispatcher.unsubscribe(token);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .finish()
    }
}
