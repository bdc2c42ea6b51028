#![forbid(unsafe_code)]

//! Lifecycle helpers for subscriptions.
//!
//! [`BindingScope`] collects subscription guards and throttled observers for
//! one logical owner (a widget, a panel, a tool window) and releases them
//! together. [`TwoWayBinding`] keeps two [`Property`] values in sync.
//!
//! ```
//! use std::rc::Rc;
//! use bindkit_core::{Bindings, Dispatcher, Property};
//! use bindkit_runtime::TwoWayBinding;
//!
//! let d = Dispatcher::new();
//! let model = Bindings::in_dispatcher(&d);
//! let view = Bindings::in_dispatcher(&d);
//! let source = Rc::new(Property::new(&model, "volume", 42));
//! let target = Rc::new(Property::new(&view, "slider", 0));
//! let _binding = TwoWayBinding::new(&source, &target).unwrap();
//! assert_eq!(target.get(), 42);
//!
//! source.set(10);
//! assert_eq!(target.get(), 10);
//! target.set(20);
//! assert_eq!(source.get(), 20);
//! ```
//!
//! # Invariants
//!
//! 1. Scope entries are released in reverse registration order.
//! 2. After `clear()` or drop, no callback registered through the scope fires.
//! 3. `TwoWayBinding` never re-enters itself: a change it forwards is not
//!    forwarded back.
//! 4. Dropping a `TwoWayBinding` unsubscribes both directions.
//!
//! # Failure Modes
//!
//! - A property dropped while bound: the forwarding callback sees a dead
//!   `Weak` and does nothing.
//! - Member lookup failure while binding: reported as the error from `new`.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use bindkit_core::{
    BindError, Bindable, Handle, MemberKey, Notification, Payload, Property, SubscribeOptions,
    Subscription,
};

use crate::scheduler::FrameScheduler;
use crate::throttle::{Throttle, ThrottledObserver};

// ---------------------------------------------------------------------------
// BindingScope
// ---------------------------------------------------------------------------

enum Entry {
    Subscription(Subscription),
    Observer(Rc<ThrottledObserver>),
}

/// Collects subscriptions and observers for one owner.
pub struct BindingScope {
    entries: Vec<Entry>,
}

impl BindingScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Keep `sub` alive until the scope is cleared or dropped.
    pub fn hold(&mut self, sub: Subscription) {
        self.entries.push(Entry::Subscription(sub));
    }

    /// Keep `observer` attached until the scope is cleared or dropped.
    pub fn hold_observer(&mut self, observer: Rc<ThrottledObserver>) {
        self.entries.push(Entry::Observer(observer));
    }

    /// Subscribe to `handle` within this scope.
    pub fn subscribe(
        &mut self,
        handle: &Handle,
        callback: impl Fn(&Payload) + 'static,
    ) -> &mut Self {
        self.hold(handle.subscribe_scoped(SubscribeOptions::new(), callback));
        self
    }

    /// Subscribe to one member of `object` within this scope.
    ///
    /// # Errors
    ///
    /// Whatever [`Bindable::subscribe_member`] reports.
    pub fn subscribe_member<B: Bindable>(
        &mut self,
        object: &B,
        member: impl Into<MemberKey>,
        options: SubscribeOptions,
        callback: impl Fn(&Payload) + 'static,
    ) -> Result<&mut Self, BindError> {
        let token = object.subscribe_member(member, options, callback)?;
        self.hold(Subscription::adopt(object.bindings().dispatcher(), token));
        Ok(self)
    }

    /// Attach a throttled observer to `handle`, register it with `scheduler`
    /// and hold it in this scope.
    pub fn observe(
        &mut self,
        handle: &Handle,
        throttle: Throttle,
        scheduler: &FrameScheduler,
        sink: impl Fn(&Notification) + 'static,
    ) -> Rc<ThrottledObserver> {
        let observer = ThrottledObserver::attach(handle, throttle, sink);
        scheduler.register(&observer);
        self.hold_observer(Rc::clone(&observer));
        observer
    }

    /// Number of held entries.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release everything now. The scope stays usable.
    pub fn clear(&mut self) {
        while let Some(entry) = self.entries.pop() {
            match entry {
                Entry::Subscription(sub) => drop(sub),
                // Other owners may still hold the observer.
                Entry::Observer(observer) => observer.detach(),
            }
        }
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TwoWayBinding<T>
// ---------------------------------------------------------------------------

/// Bidirectional binding between two properties of the same type.
///
/// Drop the binding to disconnect both directions.
pub struct TwoWayBinding<T: Clone + PartialEq + 'static> {
    _a_to_b: Subscription,
    _b_to_a: Subscription,
    guard: Rc<Cell<bool>>,
    _phantom: PhantomData<T>,
}

impl<T: Clone + PartialEq + 'static> TwoWayBinding<T> {
    /// Bind `a` and `b`. `b` first takes `a`'s current value.
    ///
    /// # Errors
    ///
    /// [`BindError::UnknownMember`] if either member is rejected under strict
    /// lookup.
    pub fn new(a: &Rc<Property<T>>, b: &Rc<Property<T>>) -> Result<Self, BindError> {
        let handle_a = a.handle()?;
        let handle_b = b.handle()?;
        b.set(a.get());

        let guard = Rc::new(Cell::new(false));
        let a_to_b = forward(&handle_a, Rc::downgrade(b), Rc::clone(&guard));
        let b_to_a = forward(&handle_b, Rc::downgrade(a), Rc::clone(&guard));

        Ok(Self {
            _a_to_b: a_to_b,
            _b_to_a: b_to_a,
            guard,
            _phantom: PhantomData,
        })
    }

    /// Whether a forwarded change is in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.guard.get()
    }
}

fn forward<T: Clone + PartialEq + 'static>(
    source: &Handle,
    target: Weak<Property<T>>,
    guard: Rc<Cell<bool>>,
) -> Subscription {
    source.subscribe_scoped(SubscribeOptions::new(), move |payload| {
        if guard.get() {
            return;
        }
        let (Some(target), Some(value)) = (target.upgrade(), payload.new::<T>()) else {
            return;
        };
        guard.set(true);
        let _reset = ResetOnDrop(&guard);
        target.set(value.clone());
    })
}

struct ResetOnDrop<'a>(&'a Cell<bool>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: Clone + PartialEq + 'static> fmt::Debug for TwoWayBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoWayBinding")
            .field("syncing", &self.guard.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
