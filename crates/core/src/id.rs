// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Safe identifiers and newtype ID wrappers.
//!
//! Every identifier that ends up in a filesystem path (agent names, job ids,
//! channel ids) must satisfy [`is_safe_identifier`]: start with an ASCII
//! letter or digit, continue with letters, digits, `_` or `-`. Anything else
//! is rejected before a path is ever built from it.

use crate::clock::Clock;

/// Maximum accepted identifier length.
///
/// Long enough for platform channel ids and generated job ids, short enough
/// to keep derived file names within filesystem limits.
pub const MAX_IDENT_LEN: usize = 128;

/// Check whether a string is a safe path-embeddable identifier.
///
/// Rules: non-empty, at most [`MAX_IDENT_LEN`] chars, first char ASCII
/// alphanumeric, remaining chars ASCII alphanumeric, `_` or `-`. This
/// excludes path separators, `..` segments, leading dots and drive prefixes
/// by construction.
pub fn is_safe_identifier(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_IDENT_LEN {
        return false;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether this id satisfies the safe-identifier grammar.
            pub fn is_safe(&self) -> bool {
                $crate::id::is_safe_identifier(&self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a job: `job-YYYY-MM-DD-<8 hex>`.
    ///
    /// The date prefix makes ids sort by creation day, which `list_jobs`
    /// relies on for chronological paging.
    #[derive(Default)]
    pub struct JobId;
}

define_id! {
    /// Name of a configured agent (the map key in the fleet file).
    #[derive(Default)]
    pub struct AgentName;
}

define_id! {
    /// Chat channel identifier as reported by a bridge.
    #[derive(Default)]
    pub struct ChannelId;
}

define_id! {
    /// Opaque conversation session id reported by the query driver.
    #[derive(Default)]
    pub struct SessionId;
}

impl JobId {
    /// Allocate a fresh job id from the clock's calendar date plus a random
    /// suffix. The result always satisfies the safe-identifier grammar.
    pub fn allocate(clock: &impl Clock) -> Self {
        let date = clock.now_utc().format("%Y-%m-%d");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("job-{}-{}", date, &suffix[..8]))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
