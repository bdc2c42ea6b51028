#![forbid(unsafe_code)]

//! Container adapters for bindkit.
//!
//! - [`BindableList`]: a `Vec` publishing `Add`, `Remove`, `Replace`,
//!   `RemoveRange`, `AddRange` and `Clear` changes.
//! - [`BindableDictionary`]: a hash map publishing the same kinds per key.
//! - [`Linkable`]: elements that bubble into the container holding them.
//!
//! Both adapters implement [`Bindable`](bindkit_core::Bindable) and can be
//! embedded in, or parented to, any other bindable object.

pub mod dictionary;
pub mod link;
pub mod list;

pub use dictionary::BindableDictionary;
pub use link::Linkable;
pub use list::BindableList;
