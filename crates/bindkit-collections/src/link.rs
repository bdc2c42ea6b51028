#![forbid(unsafe_code)]

//! Parent links for container elements.
//!
//! Containers built with `new_linked` point every element they hold at their
//! own all-members handle, so element notifications bubble into the
//! container. The link is cleared when the element leaves and swapped on
//! replace, whether or not the mutation itself notifies.

use std::rc::Rc;

use bindkit_core::{Bindable, Handle};

/// An element that can be attached to a container's handle.
pub trait Linkable {
    /// Point this element's bubbling edge at `parent`, or detach it.
    fn link(&self, parent: Option<&Handle>);
}

impl<B: Bindable + ?Sized> Linkable for Rc<B> {
    fn link(&self, parent: Option<&Handle>) {
        if let Err(err) = (**self).bindings().set_parent(parent) {
            tracing::warn!(
                error = %err,
                owner = (**self).bindings().owner().id(),
                "element parent link rejected"
            );
        }
    }
}

/// Link hook stored by a container; `None` for plain element types.
pub(crate) type Linker<T> = fn(&T, Option<&Handle>);

pub(crate) fn linker<T: Linkable>() -> Option<Linker<T>> {
    Some(<T as Linkable>::link)
}
