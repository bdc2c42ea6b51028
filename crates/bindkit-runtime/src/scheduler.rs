#![forbid(unsafe_code)]

//! Tick source for windowed observers.
//!
//! The scheduler holds weak references only; an observer that is dropped
//! simply disappears from the next tick.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::Instant;

/// Something driven by frame ticks.
pub trait Tick {
    /// Advance one frame; `now` is the frame's timestamp.
    fn tick(&self, now: Instant);
}

/// Drives registered [`Tick`] implementors once per frame.
#[derive(Default)]
pub struct FrameScheduler {
    observers: RefCell<Vec<Weak<dyn Tick>>>,
    frame: Cell<u64>,
}

impl FrameScheduler {
    /// An empty scheduler at frame zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. The scheduler does not keep it alive.
    pub fn register<T: Tick + 'static>(&self, observer: &Rc<T>) {
        let observer: Rc<dyn Tick> = Rc::clone(observer) as Rc<dyn Tick>;
        self.observers.borrow_mut().push(Rc::downgrade(&observer));
    }

    /// Advance one frame.
    ///
    /// Observers registered during the tick run from the next frame on.
    pub fn tick(&self, now: Instant) {
        let frame = self.frame.get() + 1;
        self.frame.set(frame);

        let live: Vec<Rc<dyn Tick>> = {
            let mut observers = self.observers.borrow_mut();
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        tracing::trace!(frame, observers = live.len(), "frame tick");
        for observer in live {
            observer.tick(now);
        }
    }

    /// Advance one frame at the current time.
    pub fn tick_now(&self) {
        self.tick(Instant::now());
    }

    /// Number of registered observers still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether no registered observer is still alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames ticked so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame.get()
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("observers", &self.len())
            .field("frame", &self.frame.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(Cell<u32>);

    impl Tick for Counter {
        fn tick(&self, _now: Instant) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn ticks_registered_observers() {
        let scheduler = FrameScheduler::new();
        let a = Rc::new(Counter::default());
        let b = Rc::new(Counter::default());
        scheduler.register(&a);
        scheduler.register(&b);
        scheduler.tick_now();
        scheduler.tick_now();
        assert_eq!(a.0.get(), 2);
        assert_eq!(b.0.get(), 2);
        assert_eq!(scheduler.frame(), 2);
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let scheduler = FrameScheduler::new();
        let a = Rc::new(Counter::default());
        scheduler.register(&a);
        assert_eq!(scheduler.len(), 1);
        drop(a);
        assert!(scheduler.is_empty());
        scheduler.tick_now();
        assert_eq!(scheduler.frame(), 1);
    }

    #[test]
    fn registering_during_tick_is_allowed() {
        struct Spawner {
            scheduler: Rc<FrameScheduler>,
            spawned: RefCell<Vec<Rc<Counter>>>,
        }
        impl Tick for Spawner {
            fn tick(&self, _now: Instant) {
                let child = Rc::new(Counter::default());
                self.scheduler.register(&child);
                self.spawned.borrow_mut().push(child);
            }
        }

        let scheduler = Rc::new(FrameScheduler::new());
        let spawner = Rc::new(Spawner {
            scheduler: Rc::clone(&scheduler),
            spawned: RefCell::new(Vec::new()),
        });
        scheduler.register(&spawner);
        scheduler.tick_now();
        assert_eq!(spawner.spawned.borrow()[0].0.get(), 0);
        scheduler.tick_now();
        assert_eq!(spawner.spawned.borrow()[0].0.get(), 1);
    }
}
