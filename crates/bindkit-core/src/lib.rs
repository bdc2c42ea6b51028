#![forbid(unsafe_code)]

//! Hierarchical property notifications for bindkit.
//!
//! This crate provides the notification core:
//!
//! - [`Dispatcher`]: owner of a handle arena and a bounded payload pool.
//! - [`Handle`]: a notification node for one member, or for all members, of a
//!   bindable object. Handles form a tree through non-owning parent edges and
//!   notifications bubble from child to parent.
//! - [`Bindings`] and [`Bindable`]: the per-object handle set and the contract
//!   bindable objects implement.
//! - [`Property`]: an observable member value.
//! - [`bindable_members!`]: declared member sets with typed keys.
//!
//! # Architecture
//!
//! All state is single-threaded (`Rc`/`RefCell`). Handle nodes live in a
//! generational arena owned by the dispatcher; objects refer to them by
//! [`HandleId`]. A publish leases one [`Payload`] from the dispatcher's pool,
//! runs the subscribers of each tier from origin to root, and returns the
//! payload when the call completes.
//!
//! # Invariants
//!
//! 1. Pool leases are balanced after every publish, including publishes
//!    interrupted by a panicking subscriber.
//! 2. Bubbling is decided per tier, after every subscriber of the tier ran.
//! 3. A member handle's parent is its owner's all-members handle.
//! 4. No interior borrow is held while a subscriber runs; subscribers may
//!    publish, subscribe, and drop objects re-entrantly.

mod arena;
pub mod bindable;
pub mod bindings;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod key;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod members;
pub mod payload;
pub mod pool;
pub mod property;

pub use bindable::Bindable;
pub use bindings::{Bindings, MemberResolution};
pub use config::{BindConfig, DEFAULT_POOL_CAPACITY, MemberLookup};
pub use dispatcher::Dispatcher;
pub use error::BindError;
pub use handle::{Handle, HandleId, ObserverToken, OwnerId, SubscribeOptions, Subscription};
pub use key::{DynKey, MemberKey};
pub use members::MemberSet;
pub use payload::{Change, ChangeKind, Notification, Payload, Value, value};
pub use pool::{PayloadPool, PoolLease, PoolStats, Poolable};
pub use property::Property;
