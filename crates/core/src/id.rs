// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! All identifiers here are issued by external systems — the Network hands
//! out deployment ids and base58 job addresses, the orchestrator names
//! credentials — so these are thin string wrappers whose job is to keep the
//! three id spaces from being mixed up at compile time. `Borrow<str>` is
//! implemented so `HashMap<DeploymentId, _>` supports `&str` lookups.

/// Define a string-backed identifier newtype.
macro_rules! define_str_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
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
    };
}

define_str_id! {
    /// Network-side deployment identifier.
    DeploymentId
}

define_str_id! {
    /// Base58 address of a single job under a deployment.
    ///
    /// Under a SIMPLE-EXTEND strategy the Network rotates jobs, so the
    /// addresses associated with a deployment change over its lifetime.
    JobAddress
}

define_str_id! {
    /// Orchestrator-assigned credential name. `"default"` is reserved for
    /// the legacy single-credential entry.
    CredentialName
}

impl CredentialName {
    pub const DEFAULT: &'static str = "default";

    pub fn default_name() -> Self {
        Self::new(Self::DEFAULT)
    }

    pub fn is_default(&self) -> bool {
        self.as_str() == Self::DEFAULT
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
