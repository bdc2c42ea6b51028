//! Dispatcher configuration.
//!
//! A [`BindConfig`] is fixed when a [`Dispatcher`](crate::Dispatcher) is
//! created. The thread-default dispatcher reads it from the environment:
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `BINDKIT_POOL_CAPACITY` | positive integer | `16` |
//! | `BINDKIT_MEMBER_LOOKUP` | `lenient` / `strict` | `lenient` |
//! | `BINDKIT_SUPPRESS_UNCHANGED` | `1` / `true` / `0` / `false` | `false` |
//!
//! Unparseable variables are ignored with a warning rather than failing
//! dispatcher construction.

use crate::error::BindError;

/// Default nesting bound for pooled payloads.
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// How an undeclared member name is treated by [`Bindings::resolve`](crate::Bindings::resolve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "policy-config", serde(rename_all = "lowercase"))]
pub enum MemberLookup {
    /// Log a warning and fall back to the all-members handle.
    #[default]
    Lenient,
    /// Reject the lookup with [`BindError::UnknownMember`].
    Strict,
}

impl MemberLookup {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lenient" => Some(Self::Lenient),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

/// Settings for one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct BindConfig {
    /// Maximum publish nesting depth.
    pub pool_capacity: usize,
    /// Treatment of undeclared member names.
    pub member_lookup: MemberLookup,
    /// Skip publishing when a property is set to an equal value.
    pub suppress_unchanged: bool,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            member_lookup: MemberLookup::Lenient,
            suppress_unchanged: false,
        }
    }
}

impl BindConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload pool capacity. Zero is clamped to one.
    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity.max(1);
        self
    }

    /// Set the member lookup strictness.
    #[must_use]
    pub fn with_member_lookup(mut self, lookup: MemberLookup) -> Self {
        self.member_lookup = lookup;
        self
    }

    /// Skip publishing no-op property sets.
    #[must_use]
    pub fn with_suppress_unchanged(mut self, suppress: bool) -> Self {
        self.suppress_unchanged = suppress;
        self
    }

    /// Read the configuration from process environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Split out of [`from_env`](Self::from_env) so tests need not touch the
    /// process environment.
    #[must_use]
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("BINDKIT_POOL_CAPACITY") {
            match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.pool_capacity = capacity,
                _ => tracing::warn!(value = %raw, "ignoring invalid BINDKIT_POOL_CAPACITY"),
            }
        }
        if let Some(raw) = lookup("BINDKIT_MEMBER_LOOKUP") {
            match MemberLookup::parse(&raw) {
                Some(mode) => config.member_lookup = mode,
                None => tracing::warn!(value = %raw, "ignoring invalid BINDKIT_MEMBER_LOOKUP"),
            }
        }
        if let Some(raw) = lookup("BINDKIT_SUPPRESS_UNCHANGED") {
            match parse_bool(&raw) {
                Some(flag) => config.suppress_unchanged = flag,
                None => tracing::warn!(value = %raw, "ignoring invalid BINDKIT_SUPPRESS_UNCHANGED"),
            }
        }
        config
    }

    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Config`] if the document is malformed.
    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(source: &str) -> Result<Self, BindError> {
        let config: Self = toml::from_str(source).map_err(|e| BindError::Config(e.to_string()))?;
        config.validated()
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Config`] if the document is malformed.
    #[cfg(feature = "policy-config")]
    pub fn from_json_str(source: &str) -> Result<Self, BindError> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| BindError::Config(e.to_string()))?;
        config.validated()
    }

    /// Reject values that cannot drive a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::Config`] when the pool capacity is zero.
    pub fn validated(self) -> Result<Self, BindError> {
        if self.pool_capacity == 0 {
            return Err(BindError::Config("pool_capacity must be at least 1".into()));
        }
        Ok(self)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
