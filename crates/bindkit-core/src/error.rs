#![forbid(unsafe_code)]

//! Error type shared by every bindkit crate.
//!
//! # Failure Modes
//!
//! | Error | Cause | Recoverable |
//! |-------|-------|-------------|
//! | `PoolExhausted` | Publish nested deeper than the pool capacity | No (notification cycle) |
//! | `UnknownMember` | Undeclared member name under strict lookup | Yes (lenient lookup falls back) |
//! | `StaleHandle` | Handle id whose owner was dropped | Yes |
//! | `ForeignHandle` | Parent handle from another dispatcher | Yes |
//! | `ParentCycle` | Parent edge would close a loop | Yes |
//! | `IndexOutOfRange` | List index past the end | Yes |
//! | `DuplicateKey` | Dictionary `add` of an existing key | Yes |
//! | `Config` | Malformed configuration source | Yes |

use std::fmt;

/// Errors from binding operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// A payload was requested while every pooled slot was already lent out.
    PoolExhausted { capacity: usize },
    /// A member name that the owner never declared.
    UnknownMember { member: String },
    /// The handle's owner has been dropped.
    StaleHandle,
    /// The handle belongs to a different dispatcher.
    ForeignHandle,
    /// Setting the parent would make a handle its own ancestor.
    ParentCycle,
    /// A list index outside `0..len` (or `0..=len` for inserts).
    IndexOutOfRange { index: usize, len: usize },
    /// A dictionary key that is already present.
    DuplicateKey { key: String },
    /// A configuration value could not be parsed.
    Config(String),
}

impl BindError {
    /// Whether this error signals a notification cycle.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted { capacity } => {
                write!(f, "nested publish depth exceeded (capacity {capacity})")
            }
            Self::UnknownMember { member } => write!(f, "unknown bindable member '{member}'"),
            Self::StaleHandle => write!(f, "handle refers to a destroyed owner"),
            Self::ForeignHandle => write!(f, "handle belongs to a different dispatcher"),
            Self::ParentCycle => write!(f, "parent link would create a cycle"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::DuplicateKey { key } => write!(f, "duplicate key {key}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for BindError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhausted_message_names_depth() {
        let err = BindError::PoolExhausted { capacity: 16 };
        assert_eq!(
            err.to_string(),
            "nested publish depth exceeded (capacity 16)"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn recoverable_errors_are_not_fatal() {
        assert!(!BindError::StaleHandle.is_fatal());
        assert!(
            !BindError::UnknownMember {
                member: "hp".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn index_message() {
        let err = BindError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.to_string(), "index 4 out of range for length 2");
    }
}
