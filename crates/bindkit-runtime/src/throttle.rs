#![forbid(unsafe_code)]

//! Coalescing observers.
//!
//! A [`ThrottledObserver`] sits between a [`Handle`] and a sink. With
//! [`ThrottleKind::None`] every notification is passed straight through.
//! Otherwise only the most recent notification of a window is kept and handed
//! to the sink when the window closes, which is decided on
//! [`FrameScheduler`](crate::FrameScheduler) ticks:
//!
//! | Kind | Window closes |
//! |------|---------------|
//! | `Frame` | `count` ticks after the first notification of the window |
//! | `Millisecond` | on the first tick at least `count` ms after the first notification |
//!
//! # Invariants
//!
//! 1. At most one delivery per window; it carries the latest notification.
//! 2. [`Observer::cancel`] discards the pending notification without calling
//!    the sink.
//! 3. Dropping the observer (or [`detach`](ThrottledObserver::detach))
//!    unsubscribes it from the handle.
//! 4. The sink runs with no observer state borrowed, so it may publish.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bindkit_core::{Handle, Notification, Payload, SubscribeOptions, Subscription};
use web_time::{Duration, Instant};

use crate::scheduler::Tick;

/// How a throttle measures its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottleKind {
    /// Deliver synchronously.
    #[default]
    None,
    /// Window measured in scheduler ticks.
    Frame,
    /// Window measured in milliseconds.
    Millisecond,
}

/// A coalescing policy: `count` frames or milliseconds per delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throttle {
    /// Unit of the window.
    pub kind: ThrottleKind,
    /// Window length in `kind` units.
    pub count: u32,
}

impl Throttle {
    /// Pass every notification through.
    pub const NONE: Self = Self {
        kind: ThrottleKind::None,
        count: 0,
    };

    /// A window of `count` units of `kind`.
    #[must_use]
    pub const fn new(kind: ThrottleKind, count: u32) -> Self {
        Self { kind, count }
    }

    /// At most one delivery every `count` ticks.
    #[must_use]
    pub const fn frames(count: u32) -> Self {
        Self::new(ThrottleKind::Frame, count)
    }

    /// At most one delivery every `count` milliseconds.
    #[must_use]
    pub const fn millis(count: u32) -> Self {
        Self::new(ThrottleKind::Millisecond, count)
    }

    /// Whether notifications bypass the window.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self.kind, ThrottleKind::None)
    }
}

/// Something that reacts to payloads delivered by a handle.
pub trait Observer {
    /// Handle one notification.
    fn execute(&self, payload: &Payload);

    /// Drop any notification not yet delivered.
    fn cancel(&self);
}

type Sink = dyn Fn(&Notification);

/// A throttled subscription to one handle.
pub struct ThrottledObserver {
    throttle: Throttle,
    sink: Box<Sink>,
    pending: RefCell<Option<Notification>>,
    frames_left: Cell<u32>,
    window_start: Cell<Option<Instant>>,
    subscription: RefCell<Option<Subscription>>,
    delivered: Cell<u64>,
    coalesced: Cell<u64>,
}

impl ThrottledObserver {
    /// Subscribe `sink` to `handle` through `throttle`.
    ///
    /// Windowed observers only deliver when ticked; register the returned
    /// observer with a [`FrameScheduler`](crate::FrameScheduler).
    pub fn attach(
        handle: &Handle,
        throttle: Throttle,
        sink: impl Fn(&Notification) + 'static,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let subscription = handle.subscribe_scoped(SubscribeOptions::new(), move |payload| {
                if let Some(observer) = weak.upgrade() {
                    observer.execute(payload);
                }
            });
            Self {
                throttle,
                sink: Box::new(sink),
                pending: RefCell::new(None),
                frames_left: Cell::new(0),
                window_start: Cell::new(None),
                subscription: RefCell::new(Some(subscription)),
                delivered: Cell::new(0),
                coalesced: Cell::new(0),
            }
        })
    }

    /// The policy this observer was attached with.
    #[must_use]
    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Whether a notification is waiting for its window to close.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Number of notifications handed to the sink.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.get()
    }

    /// Number of notifications replaced by a later one in the same window.
    #[must_use]
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.get()
    }

    /// Whether the observer is still subscribed.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    /// Deliver the pending notification now, ignoring the window.
    pub fn flush(&self) {
        let pending = self.pending.borrow_mut().take();
        self.window_start.set(None);
        if let Some(notification) = pending {
            self.deliver(&notification);
        }
    }

    /// Unsubscribe and discard anything pending.
    pub fn detach(&self) {
        self.cancel();
        let subscription = self.subscription.borrow_mut().take();
        drop(subscription);
    }

    fn deliver(&self, notification: &Notification) {
        self.delivered.set(self.delivered.get() + 1);
        (self.sink)(notification);
    }

    fn window_closed(&self, now: Instant) -> bool {
        match self.throttle.kind {
            ThrottleKind::None => true,
            ThrottleKind::Frame => {
                let left = self.frames_left.get().saturating_sub(1);
                self.frames_left.set(left);
                left == 0
            }
            ThrottleKind::Millisecond => {
                let window = Duration::from_millis(u64::from(self.throttle.count));
                self.window_start
                    .get()
                    .is_none_or(|start| now.saturating_duration_since(start) >= window)
            }
        }
    }
}

impl Observer for ThrottledObserver {
    fn execute(&self, payload: &Payload) {
        if self.throttle.is_immediate() {
            self.deliver(&payload.to_notification());
            return;
        }
        let replaced = self
            .pending
            .borrow_mut()
            .replace(payload.to_notification())
            .is_some();
        if replaced {
            self.coalesced.set(self.coalesced.get() + 1);
            tracing::trace!(member = %payload.member(), "throttled notification coalesced");
        } else {
            self.frames_left.set(self.throttle.count.max(1));
            self.window_start.set(Some(Instant::now()));
        }
    }

    fn cancel(&self) {
        let dropped = self.pending.borrow_mut().take();
        self.window_start.set(None);
        if dropped.is_some() {
            tracing::debug!("pending throttled notification cancelled");
        }
    }
}

impl Tick for ThrottledObserver {
    fn tick(&self, now: Instant) {
        if !self.has_pending() || !self.window_closed(now) {
            return;
        }
        self.flush();
    }
}

impl fmt::Debug for ThrottledObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledObserver")
            .field("throttle", &self.throttle)
            .field("pending", &self.has_pending())
            .field("delivered", &self.delivered.get())
            .finish_non_exhaustive()
    }
}
