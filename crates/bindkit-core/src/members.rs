//! Compile-time member declarations.
//!
//! [`bindable_members!`](crate::bindable_members) turns a list of member
//! identifiers into an enum implementing [`MemberSet`]. The enum converts into
//! a [`MemberKey`](crate::MemberKey), so subscribers get a typed accessor
//! instead of a string, and [`Bindings::for_members`](crate::Bindings::for_members)
//! learns the declared names for unknown-member detection.

/// A closed set of declared members.
pub trait MemberSet: Copy + Eq + 'static {
    /// Every member name, in declaration order.
    const NAMES: &'static [&'static str];

    /// Every member, in declaration order.
    const ALL: &'static [Self];

    /// The member's key name.
    fn name(self) -> &'static str;

    /// Look a member up by its key name.
    fn from_name(name: &str) -> Option<Self>;
}

/// Declare the bindable members of a type.
///
/// # Examples
///
/// ```
/// use bindkit_core::{bindable_members, MemberKey, MemberSet};
///
/// bindable_members! {
///     /// Members of a player view-model.
///     pub enum PlayerMember {
///         Health => "health",
///         Name => "name",
///     }
/// }
///
/// assert_eq!(PlayerMember::NAMES, &["health", "name"]);
/// assert_eq!(PlayerMember::from_name("name"), Some(PlayerMember::Name));
/// assert_eq!(MemberKey::from(PlayerMember::Health), MemberKey::from("health"));
/// ```
#[macro_export]
macro_rules! bindable_members {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::members::MemberSet for $name {
            const NAMES: &'static [&'static str] = &[$($label),+];
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            fn from_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    $($label => ::core::option::Option::Some(Self::$variant),)+
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl ::core::convert::From<$name> for $crate::key::MemberKey {
            fn from(member: $name) -> Self {
                $crate::key::MemberKey::Name(::std::borrow::Cow::Borrowed(
                    <$name as $crate::members::MemberSet>::name(member),
                ))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::MemberSet;
    use crate::key::MemberKey;

    crate::bindable_members! {
        enum Sample {
            Alpha => "alpha",
            Beta => "beta",
        }
    }

    #[test]
    fn names_follow_declaration_order() {
        assert_eq!(Sample::NAMES, &["alpha", "beta"]);
        assert_eq!(Sample::ALL, &[Sample::Alpha, Sample::Beta]);
    }

    #[test]
    fn name_round_trip() {
        for member in Sample::ALL {
            assert_eq!(Sample::from_name(member.name()), Some(*member));
        }
        assert_eq!(Sample::from_name("gamma"), None);
    }

    #[test]
    fn converts_to_named_key() {
        assert_eq!(MemberKey::from(Sample::Beta), MemberKey::from("beta"));
    }
}
