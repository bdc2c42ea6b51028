//! Member keys addressing individual handles of a bindable object.
//!
//! A [`MemberKey`] names either the whole object ([`MemberKey::All`]), a
//! declared member, a positional slot, or an arbitrary hashable key such as a
//! dictionary entry. Dictionary keys are erased into a [`DynKey`] so one
//! handle map can hold them alongside named members.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Identifies one handle of a bindable object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemberKey {
    /// The object as a whole.
    #[default]
    All,
    /// A named member, usually generated by [`bindable_members!`](crate::bindable_members).
    Name(Cow<'static, str>),
    /// A positional slot (list index).
    Index(usize),
    /// Any other key, type-erased.
    Key(DynKey),
}

impl MemberKey {
    /// Erase an arbitrary key.
    #[must_use]
    pub fn key<K: Any + Eq + Hash + fmt::Debug>(key: K) -> Self {
        Self::Key(DynKey::new(key))
    }

    /// Whether this is the all-members key.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The member name, if this is a named key.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    /// The index, if this is a positional key.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Downcast an erased key.
    #[must_use]
    pub fn downcast_key<K: Any>(&self) -> Option<&K> {
        match self {
            Self::Key(key) => key.downcast_ref(),
            _ => None,
        }
    }
}

impl From<&'static str> for MemberKey {
    fn from(name: &'static str) -> Self {
        Self::Name(Cow::Borrowed(name))
    }
}

impl From<String> for MemberKey {
    fn from(name: String) -> Self {
        Self::Name(Cow::Owned(name))
    }
}

impl From<usize> for MemberKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Name(name) => f.write_str(name),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(key) => write!(f, "{key:?}"),
        }
    }
}

trait KeyObject: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn key_type(&self) -> TypeId;
    fn dyn_eq(&self, other: &dyn KeyObject) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<K: Any + Eq + Hash + fmt::Debug> KeyObject for K {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn key_type(&self) -> TypeId {
        TypeId::of::<K>()
    }

    fn dyn_eq(&self, other: &dyn KeyObject) -> bool {
        other.as_any().downcast_ref::<K>() == Some(self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// A type-erased hashable key.
///
/// Two `DynKey`s are equal only when they wrap the same concrete type and the
/// wrapped values compare equal.
#[derive(Clone)]
pub struct DynKey(Rc<dyn KeyObject>);

impl DynKey {
    /// Wrap a key.
    #[must_use]
    pub fn new<K: Any + Eq + Hash + fmt::Debug>(key: K) -> Self {
        Self(Rc::new(key))
    }

    /// Borrow the wrapped key if it has type `K`.
    #[must_use]
    pub fn downcast_ref<K: Any>(&self) -> Option<&K> {
        self.0.as_ref().as_any().downcast_ref()
    }

    /// Whether the wrapped key has type `K`.
    #[must_use]
    pub fn is<K: Any>(&self) -> bool {
        self.0.as_ref().key_type() == TypeId::of::<K>()
    }
}

impl PartialEq for DynKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref().dyn_eq(other.0.as_ref())
    }
}

impl Eq for DynKey {}

impl Hash for DynKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.as_ref().dyn_hash(state);
    }
}

impl fmt::Debug for DynKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}
