//! Generational storage for handle nodes.
//!
//! Parent edges between handles are plain [`HandleId`]s into this arena, so a
//! parent is a relation rather than an owner. Removing a node bumps its slot
//! generation; ids held elsewhere (children, tokens, stale `Handle`s) stop
//! resolving instead of aliasing a reused slot.

use std::cell::Cell;
use std::rc::Rc;

use crate::handle::{HandleId, OwnerId};
use crate::key::MemberKey;
use crate::payload::{Payload, Value};

pub(crate) type Callback = dyn Fn(&Payload);

pub(crate) struct Subscriber {
    pub(crate) serial: u64,
    pub(crate) callback: Rc<Callback>,
    pub(crate) always_notify: bool,
    /// Cleared on unsubscribe so in-flight deliveries skip the callback.
    pub(crate) active: Rc<Cell<bool>>,
}

/// First old and last new value of one member published through an
/// all-members node while it was suspended.
pub(crate) struct SuspendedMember {
    pub(crate) member: MemberKey,
    pub(crate) old: Option<Value>,
    pub(crate) new: Option<Value>,
}

pub(crate) struct HandleNode {
    pub(crate) owner: OwnerId,
    pub(crate) member: MemberKey,
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) notify_enabled: bool,
    pub(crate) parent: Option<HandleId>,
    pub(crate) cached: Option<Value>,
    pub(crate) suspended_base: Option<Value>,
    pub(crate) dirty: bool,
    /// Member-tagged publishes absorbed while suspended, in first-change order.
    pub(crate) suspended_members: Vec<SuspendedMember>,
}

impl HandleNode {
    pub(crate) fn new(owner: OwnerId, member: MemberKey, parent: Option<HandleId>) -> Self {
        Self {
            owner,
            member,
            subscribers: Vec::new(),
            notify_enabled: true,
            parent,
            cached: None,
            suspended_base: None,
            dirty: false,
            suspended_members: Vec::new(),
        }
    }

    /// Fold a member-tagged change into the suspension record.
    pub(crate) fn absorb_member(&mut self, member: &MemberKey, old: Option<Value>, new: Option<Value>) {
        match self.suspended_members.iter_mut().find(|m| &m.member == member) {
            Some(entry) => entry.new = new,
            None => self.suspended_members.push(SuspendedMember {
                member: member.clone(),
                old,
                new,
            }),
        }
    }

    pub(crate) fn deactivate_all(&self) {
        for sub in &self.subscribers {
            sub.active.set(false);
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<HandleNode>,
}

#[derive(Default)]
pub(crate) struct HandleArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleArena {
    pub(crate) fn insert(&mut self, node: HandleNode) -> HandleId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return HandleId::new(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        HandleId::new(index, 0)
    }

    pub(crate) fn remove(&mut self, id: HandleId) -> Option<HandleNode> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.live -= 1;
        Some(node)
    }

    pub(crate) fn get(&self, id: HandleId) -> Option<&HandleNode> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: HandleId) -> Option<&mut HandleNode> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> HandleNode {
        HandleNode::new(OwnerId::NONE, MemberKey::All, None)
    }

    #[test]
    fn insert_and_get() {
        let mut arena = HandleArena::default();
        let a = arena.insert(node());
        let b = arena.insert(node());
        assert_ne!(a, b);
        assert!(arena.get(a).is_some());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn removed_ids_go_stale() {
        let mut arena = HandleArena::default();
        let a = arena.insert(node());
        assert!(arena.remove(a).is_some());
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());

        let b = arena.insert(node());
        assert_eq!(b.index(), a.index(), "slot is reused");
        assert_ne!(b, a, "generation differs");
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert_eq!(arena.len(), 1);
    }
}
