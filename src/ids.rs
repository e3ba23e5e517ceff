//! Random identifiers for events and subscriber registrations.
//!
//! Identifiers are 16 characters drawn from `[a-zA-Z0-9]`, which gives
//! roughly 95 bits of entropy: unguessable and unique enough for the
//! lifetime of a process. The randomness source is the thread-local RNG,
//! so generation is safe from any number of concurrent tasks.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of every generated identifier.
pub const ID_LEN: usize = 16;

/// Generate a random alphanumeric identifier.
pub fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

macro_rules! random_id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(random_id())
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

random_id_type!(
    /// Identifier attached to a published event at creation.
    EventId
);
random_id_type!(
    /// Identifier assigned by the broadcaster when a subscriber registers.
    SubscriberId
);
