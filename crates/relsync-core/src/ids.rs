//! Strongly Typed Identifiers
//!
//! Numeric newtypes for the identifiers the target store hands out. Keeping
//! them distinct prevents a role id from being passed where a user's
//! identity key is expected.
//!
//! # Example
//!
//! ```
//! use relsync_core::{IdentityKey, RoleId};
//!
//! let user: IdentityKey = "42".parse().unwrap();
//! assert_eq!(user.value(), 42);
//!
//! fn describe(role: RoleId) -> String {
//!     role.to_string()
//! }
//!
//! assert_eq!(describe(RoleId::new(7)), "7");
//! // describe(user); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The rejected input
    pub input: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {} from '{}'", self.id_type, self.input)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed numeric ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw store identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw store identifier.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| ParseIdError {
                        id_type: stringify!($name),
                        input: s.to_string(),
                    })
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Canonical identifier of a user in the target store.
    ///
    /// Every relationship key built for diffing uses this form for both the
    /// subject and the object.
    IdentityKey
);

define_id!(
    /// Identifier of a role definition in the target store.
    RoleId
);

define_id!(
    /// Identifier of the scope ("context") an assignment is attached to.
    ContextId
);
