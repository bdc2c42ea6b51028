#![forbid(unsafe_code)]

//! The bindable contract.
//!
//! Implementors supply their [`Bindings`] and, optionally, the current value
//! of each member; everything else (handle lookup, subscription, re-publish,
//! suspension, parenting) is provided.
//!
//! ```
//! use bindkit_core::{Bindable, Bindings, Dispatcher, MemberKey, Property, SubscribeOptions, Value};
//!
//! struct Unit {
//!     bindings: Bindings,
//!     hp: Property<i32>,
//! }
//!
//! impl Bindable for Unit {
//!     fn bindings(&self) -> &Bindings {
//!         &self.bindings
//!     }
//!
//!     fn member_value(&self, member: &MemberKey) -> Option<Value> {
//!         match member.name() {
//!             Some("hp") => Some(self.hp.value_any()),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let bindings = Bindings::in_dispatcher(&Dispatcher::new());
//! let unit = Unit { hp: Property::new(&bindings, "hp", 10), bindings };
//! let token = unit
//!     .subscribe_member("hp", SubscribeOptions::new(), |p| {
//!         assert_eq!(p.new::<i32>(), Some(&7));
//!     })
//!     .unwrap();
//! unit.hp.set(7);
//! assert!(unit.unsubscribe(token));
//! ```

use std::rc::Rc;

use crate::bindings::Bindings;
use crate::error::BindError;
use crate::handle::{Handle, ObserverToken, SubscribeOptions};
use crate::key::MemberKey;
use crate::payload::{Change, Payload, Value};

/// An object whose members can be observed.
pub trait Bindable {
    /// The object's handle set.
    fn bindings(&self) -> &Bindings;

    /// Current value of `member`. [`MemberKey::All`] asks for a snapshot of
    /// the whole object. The default knows no values.
    fn member_value(&self, member: &MemberKey) -> Option<Value> {
        let _ = member;
        None
    }

    /// Fetch or create the handle for `member`, seeding a new handle's cache
    /// with the member's current value.
    ///
    /// # Errors
    ///
    /// [`BindError::UnknownMember`] under strict lookup.
    fn get_handle(&self, member: MemberKey) -> Result<Handle, BindError> {
        let (handle, created) = self.bindings().handle_entry(member.clone())?;
        if created {
            handle.store_value(self.member_value(&member));
        }
        Ok(handle)
    }

    /// Subscribe to every change of the object.
    fn subscribe(&self, callback: impl Fn(&Payload) + 'static) -> ObserverToken
    where
        Self: Sized,
    {
        self.bindings().all_members().subscribe(callback)
    }

    /// Subscribe to one member.
    ///
    /// # Errors
    ///
    /// [`BindError::UnknownMember`] under strict lookup, or
    /// [`BindError::PoolExhausted`] if the first notification cannot run.
    fn subscribe_member(
        &self,
        member: impl Into<MemberKey>,
        options: SubscribeOptions,
        callback: impl Fn(&Payload) + 'static,
    ) -> Result<ObserverToken, BindError>
    where
        Self: Sized,
    {
        let member = member.into();
        let handle = self.get_handle(member.clone())?;
        let current = if options.first_notify {
            self.member_value(&member)
        } else {
            None
        };
        handle.subscribe_seeded(options, current, Rc::new(callback))
    }

    /// Remove a subscription made through any of this object's handles.
    fn unsubscribe(&self, token: ObserverToken) -> bool {
        self.bindings()
            .dispatcher()
            .handle(token.handle())
            .is_some_and(|handle| handle.unsubscribe(token))
    }

    /// Re-publish the whole object as `(current, current)`.
    fn publish(&self) {
        let change = Change::republish(self.member_value(&MemberKey::All));
        self.bindings().all_members().publish_change(change);
    }

    /// Re-publish one member as `(cached, current)`.
    fn publish_member(&self, member: MemberKey) {
        if let Err(err) = self.try_publish_member(member) {
            self.bindings().dispatcher().escalate(&err);
        }
    }

    /// Re-publish one member, reporting failures.
    ///
    /// # Errors
    ///
    /// [`BindError::PoolExhausted`] past the nesting bound.
    fn try_publish_member(&self, member: MemberKey) -> Result<(), BindError> {
        if member.is_all() {
            let change = Change::republish(self.member_value(&MemberKey::All));
            return self.bindings().all_members().try_publish_change(change);
        }
        let current = self.member_value(&member);
        let old = self
            .bindings()
            .existing_handle(&member)
            .and_then(|h| h.cached_value())
            .or_else(|| current.clone());
        self.bindings().try_publish_change(Change {
            member: Some(member),
            old,
            new: current,
            ..Change::default()
        })
    }

    /// Re-publish every declared or handled member; objects without members
    /// re-publish as a whole.
    fn publish_all(&self) {
        let bindings = self.bindings();
        let mut keys: Vec<MemberKey> = bindings
            .handles()
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| !key.is_all())
            .collect();
        if let Some(names) = bindings.declared_members() {
            for name in names {
                let key = MemberKey::from(*name);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            self.publish();
            return;
        }
        for key in keys {
            self.publish_member(key);
        }
    }

    /// Suspend or resume delivery on every handle of the object.
    ///
    /// Resuming with `retroactive` emits one coalesced notification per
    /// member changed while suspended, whether it has its own handle or was
    /// routed through the all-members handle, and then one for the object
    /// itself if it was published as a whole.
    fn set_notify(&self, enabled: bool, retroactive: bool) {
        if let Err(err) = self.try_set_notify(enabled, retroactive) {
            self.bindings().dispatcher().escalate(&err);
        }
    }

    /// Suspend or resume, reporting failures.
    ///
    /// # Errors
    ///
    /// [`BindError::PoolExhausted`] if a flush cannot run.
    fn try_set_notify(&self, enabled: bool, retroactive: bool) -> Result<(), BindError> {
        let handles = self.bindings().handles();
        let dispatcher = self.bindings().dispatcher();
        if !enabled {
            for (key, handle) in &handles {
                dispatcher.suspend(handle.id(), self.member_value(key))?;
            }
            return Ok(());
        }

        let mut pending = Vec::new();
        for (key, handle) in handles {
            let resumed = dispatcher.resume(handle.id())?;
            if resumed.base.is_some() || !resumed.members.is_empty() {
                pending.push((key, handle, resumed));
            }
        }
        if !retroactive {
            return Ok(());
        }
        for (key, handle, resumed) in pending {
            for entry in resumed.members {
                let current = self.member_value(&entry.member).or(entry.new);
                handle.try_publish_change(Change {
                    member: Some(entry.member),
                    old: entry.old,
                    new: current,
                    ..Change::default()
                })?;
            }
            if let Some(base) = resumed.base {
                let current = self.member_value(&key).or_else(|| handle.cached_value());
                handle.try_publish_change(Change {
                    old: base,
                    new: current,
                    ..Change::default()
                })?;
            }
        }
        Ok(())
    }

    /// Whether the object delivers notifications.
    fn is_notify_enabled(&self) -> bool {
        self.bindings().is_notify_enabled()
    }

    /// Bubble this object's notifications into `parent` (or stop bubbling).
    ///
    /// # Errors
    ///
    /// [`BindError::ForeignHandle`] or [`BindError::ParentCycle`].
    fn set_parent(&self, parent: Option<&dyn Bindable>) -> Result<(), BindError> {
        let parent = parent.map(|p| p.bindings().all_members());
        self.bindings().set_parent(parent.as_ref())
    }

    /// Clear the parent link.
    fn detach(&self) {
        if let Err(err) = self.bindings().set_parent(None) {
            self.bindings().dispatcher().escalate(&err);
        }
    }
}

impl<B: Bindable + ?Sized> Bindable for Rc<B> {
    fn bindings(&self) -> &Bindings {
        (**self).bindings()
    }

    fn member_value(&self, member: &MemberKey) -> Option<Value> {
        (**self).member_value(member)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::payload::ChangeKind;
    use crate::property::Property;

    struct Node {
        bindings: Bindings,
        x: Property<i32>,
        y: Property<i32>,
    }

    impl Node {
        fn new(d: &Dispatcher) -> Self {
            let bindings = Bindings::in_dispatcher(d);
            Self {
                x: Property::new(&bindings, "x", 0),
                y: Property::new(&bindings, "y", 0),
                bindings,
            }
        }
    }

    impl Bindable for Node {
        fn bindings(&self) -> &Bindings {
            &self.bindings
        }

        fn member_value(&self, member: &MemberKey) -> Option<Value> {
            match member.name()? {
                "x" => Some(self.x.value_any()),
                "y" => Some(self.y.value_any()),
                _ => None,
            }
        }
    }

    fn log_into(log: &Rc<RefCell<Vec<(String, Option<i32>, Option<i32>)>>>) -> impl Fn(&Payload) + 'static {
        let log = Rc::clone(log);
        move |p: &Payload| {
            log.borrow_mut().push((
                p.member().to_string(),
                p.old::<i32>().copied(),
                p.new::<i32>().copied(),
            ));
        }
    }

    #[test]
    fn new_member_handle_is_seeded() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        node.x.set_raw(4);
        let handle = node.get_handle("x".into()).unwrap();
        assert_eq!(handle.value::<i32>(), Some(4));
    }

    #[test]
    fn member_changes_reach_object_subscribers() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let log = Rc::new(RefCell::new(Vec::new()));
        node.subscribe(log_into(&log));
        node.x.set(1);
        node.y.set(2);
        assert_eq!(
            *log.borrow(),
            vec![
                ("x".into(), Some(0), Some(1)),
                ("y".into(), Some(0), Some(2)),
            ]
        );
    }

    #[test]
    fn member_subscription_filters_other_members() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let log = Rc::new(RefCell::new(Vec::new()));
        node.subscribe_member("x", SubscribeOptions::new(), log_into(&log))
            .unwrap();
        node.y.set(9);
        node.x.set(3);
        assert_eq!(*log.borrow(), vec![("x".into(), Some(0), Some(3))]);
    }

    #[test]
    fn publish_member_after_raw_set() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let log = Rc::new(RefCell::new(Vec::new()));
        node.subscribe_member("x", SubscribeOptions::new(), log_into(&log))
            .unwrap();
        node.x.set_raw(8);
        node.publish_member("x".into());
        assert_eq!(*log.borrow(), vec![("x".into(), Some(0), Some(8))]);
    }

    #[test]
    fn publish_all_covers_declared_handles() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        node.get_handle("x".into()).unwrap();
        node.get_handle("y".into()).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        node.subscribe(log_into(&log));
        node.publish_all();
        let members: Vec<String> = log.borrow().iter().map(|e| e.0.clone()).collect();
        assert_eq!(members, vec!["x", "y"]);
    }

    #[test]
    fn retroactive_resume_flushes_members_then_object() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let log = Rc::new(RefCell::new(Vec::new()));
        node.subscribe_member("x", SubscribeOptions::new(), |_| {}).unwrap();
        node.subscribe(log_into(&log));

        node.set_notify(false, false);
        assert!(!node.is_notify_enabled());
        node.x.set(1);
        node.x.set(2);
        node.x.set(3);
        assert!(log.borrow().is_empty());

        node.set_notify(true, true);
        assert_eq!(*log.borrow(), vec![("x".into(), Some(0), Some(3))]);
    }

    #[test]
    fn retroactive_resume_without_member_handles_keeps_each_member() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let log = Rc::new(RefCell::new(Vec::new()));
        node.subscribe(log_into(&log));

        node.set_notify(false, false);
        for v in 1..=4 {
            node.x.set(v);
        }
        node.y.set(9);
        assert!(log.borrow().is_empty());

        node.set_notify(true, true);
        assert_eq!(
            *log.borrow(),
            vec![
                ("x".into(), Some(0), Some(4)),
                ("y".into(), Some(0), Some(9)),
            ]
        );
        assert!(d.pool_stats().is_balanced());
    }

    #[test]
    fn member_publish_leaves_object_value_alone() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let all = node.bindings().all_members();
        node.x.set(3);
        assert!(all.cached_value().is_none());
    }

    #[test]
    fn resume_without_retroactive_is_silent() {
        let d = Dispatcher::new();
        let node = Node::new(&d);
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        node.subscribe(move |_| *c.borrow_mut() += 1);
        node.set_notify(false, false);
        node.x.set(5);
        node.set_notify(true, false);
        assert_eq!(*count.borrow(), 0);
        node.x.set(6);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn child_bubbles_into_parent() {
        let d = Dispatcher::new();
        let parent = Node::new(&d);
        let child = Node::new(&d);
        child.set_parent(Some(&parent)).unwrap();

        let kinds = Rc::new(RefCell::new(Vec::new()));
        let k = Rc::clone(&kinds);
        parent.subscribe(move |p| k.borrow_mut().push((p.kind(), p.is_bubbled())));
        child.x.set(1);
        assert_eq!(*kinds.borrow(), vec![(ChangeKind::Publish, true)]);

        child.detach();
        child.x.set(2);
        assert_eq!(kinds.borrow().len(), 1);
    }

    #[test]
    fn rc_objects_are_bindable() {
        let d = Dispatcher::new();
        let node = Rc::new(Node::new(&d));
        let parent = Node::new(&d);
        node.set_parent(Some(&parent)).unwrap();
        assert_eq!(node.bindings().parent(), Some(parent.bindings().all_members().id()));
    }
}
