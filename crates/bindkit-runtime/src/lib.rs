#![forbid(unsafe_code)]

//! Frame-driven delivery on top of bindkit handles.
//!
//! - [`ThrottledObserver`] coalesces notifications into frame or millisecond
//!   windows.
//! - [`FrameScheduler`] ticks registered observers once per frame.
//! - [`BindingScope`] and [`TwoWayBinding`] manage subscription lifetimes.

pub mod binding;
pub mod scheduler;
pub mod throttle;

pub use binding::{BindingScope, TwoWayBinding};
pub use scheduler::{FrameScheduler, Tick};
pub use throttle::{Observer, Throttle, ThrottleKind, ThrottledObserver};
