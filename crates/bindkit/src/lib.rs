#![forbid(unsafe_code)]

//! bindkit public facade.
//!
//! Objects own [`Bindings`]; members are [`Property`] values or container
//! adapters. Changes publish through per-member handles and bubble to the
//! all-members handle, then through the parent chain.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use bindkit::prelude::*;
//!
//! let d = Dispatcher::new();
//! let owner = Bindings::in_dispatcher(&d);
//! let hp = Property::new(&owner, "hp", 10);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let s = Rc::clone(&seen);
//! let _sub = owner.all_members().subscribe_scoped(SubscribeOptions::new(), move |p| {
//!     s.borrow_mut().push((*p.old::<i32>().unwrap(), *p.new::<i32>().unwrap()));
//! });
//! hp.set(7);
//! assert_eq!(*seen.borrow(), vec![(10, 7)]);
//! ```

pub use bindkit_collections as collections;
#[cfg(feature = "runtime")]
pub use bindkit_runtime as runtime;

pub use bindkit_collections::{BindableDictionary, BindableList, Linkable};
pub use bindkit_core::{
    BindConfig, BindError, Bindable, Bindings, Change, ChangeKind, Dispatcher, Handle, HandleId,
    MemberKey, MemberLookup, MemberSet, Notification, ObserverToken, Payload, Property,
    SubscribeOptions, Subscription, Value, bindable_members, value,
};
#[cfg(feature = "runtime")]
pub use bindkit_runtime::{
    BindingScope, FrameScheduler, Observer, Throttle, ThrottleKind, ThrottledObserver,
    TwoWayBinding,
};

/// Standard imports for bindkit users.
pub mod prelude {
    pub use crate::{
        BindConfig, BindError, Bindable, BindableDictionary, BindableList, Bindings, Change,
        ChangeKind, Dispatcher, Handle, Linkable, MemberKey, MemberSet, Notification, Payload,
        Property, SubscribeOptions, Subscription, Value,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{BindingScope, FrameScheduler, Throttle, ThrottledObserver, TwoWayBinding};
}
