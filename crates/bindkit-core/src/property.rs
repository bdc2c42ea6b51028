#![forbid(unsafe_code)]

//! Observable member values.
//!
//! A [`Property`] stores one member of a bindable object and publishes
//! `(old, new)` through the owner's [`Bindings`] on every set. The old value
//! is taken before the store, so subscribers always see the pre-change value.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::bindings::Bindings;
use crate::error::BindError;
use crate::handle::{Handle, ObserverToken, SubscribeOptions};
use crate::key::MemberKey;
use crate::payload::{Change, Payload, Value, value};

/// One observable member of a bindable object.
pub struct Property<T> {
    owner: Bindings,
    member: MemberKey,
    value: RefCell<T>,
    /// Value before the first unpublished `set_raw`.
    pending: RefCell<Option<T>>,
}

impl<T: Clone + PartialEq + 'static> Property<T> {
    /// Create a property for `member` of the object owning `owner`.
    pub fn new(owner: &Bindings, member: impl Into<MemberKey>, initial: T) -> Self {
        Self {
            owner: owner.clone(),
            member: member.into(),
            value: RefCell::new(initial),
            pending: RefCell::new(None),
        }
    }

    /// Clone the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Access the current value by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// The member key this property publishes under.
    #[must_use]
    pub fn member(&self) -> &MemberKey {
        &self.member
    }

    /// The current value, type-erased.
    #[must_use]
    pub fn value_any(&self) -> Value {
        value(self.get())
    }

    /// Store `new` and publish `(old, new)`.
    ///
    /// # Panics
    ///
    /// Panics if the publish depth is exhausted.
    pub fn set(&self, new: T) {
        if let Err(err) = self.try_set(new) {
            self.owner.dispatcher().escalate(&err);
        }
    }

    /// Store `new` and publish, reporting failures. Returns whether a
    /// notification was sent.
    ///
    /// # Errors
    ///
    /// [`BindError::PoolExhausted`] past the nesting bound. The value is
    /// stored even then.
    pub fn try_set(&self, new: T) -> Result<bool, BindError> {
        let old = self.value.replace(new.clone());
        self.pending.borrow_mut().take();
        if old == new && self.owner.dispatcher().config().suppress_unchanged {
            return Ok(false);
        }
        self.owner
            .try_publish_change(Change::value(old, new).with_member(self.member.clone()))?;
        Ok(true)
    }

    /// Modify the value in place and publish `(old, new)`.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Store without publishing. A later [`publish`](Self::publish) reports
    /// the value from before the first unpublished raw set as old.
    pub fn set_raw(&self, new: T) {
        let old = self.value.replace(new);
        self.pending.borrow_mut().get_or_insert(old);
    }

    /// Re-publish the member as `(pending-or-cached-or-current, current)`.
    pub fn publish(&self) {
        let current = self.get();
        let old = self
            .pending
            .borrow_mut()
            .take()
            .map(value)
            .or_else(|| {
                self.owner
                    .existing_handle(&self.member)
                    .and_then(|h| h.cached_value())
            })
            .unwrap_or_else(|| value(current.clone()));
        self.owner.publish_change(Change {
            member: Some(self.member.clone()),
            old: Some(old),
            new: Some(value(current)),
            ..Change::default()
        });
    }

    /// The member's handle, created on first use with the current value
    /// cached.
    ///
    /// # Errors
    ///
    /// [`BindError::UnknownMember`] under strict lookup.
    pub fn handle(&self) -> Result<Handle, BindError> {
        let (handle, created) = self.owner.handle_entry(self.member.clone())?;
        if created {
            handle.store_value(Some(self.value_any()));
        }
        Ok(handle)
    }

    /// Subscribe to this member. With `first_notify` the callback sees the
    /// current value immediately.
    ///
    /// # Errors
    ///
    /// See [`handle`](Self::handle) and [`Handle::try_subscribe_with`].
    pub fn subscribe(
        &self,
        options: SubscribeOptions,
        callback: impl Fn(&Payload) + 'static,
    ) -> Result<ObserverToken, BindError> {
        let handle = self.handle()?;
        handle.subscribe_seeded(options, Some(self.value_any()), Rc::new(callback))
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("member", &self.member)
            .field("value", &*self.value.borrow())
            .finish()
    }
}
