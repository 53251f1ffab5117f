//! Arena handles
//!
//! Registered objects are addressed by their index in the owning registry.
//! Handle order is registration order, which is also the lock order.

use serde::Serialize;
use std::fmt;

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Registration index
            #[inline]
            pub const fn index(&self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_handle!(
    /// Handle to a registered voltage domain
    VdHandle,
    "vd"
);
arena_handle!(
    /// Handle to a registered power domain
    PdHandle,
    "pd"
);
arena_handle!(
    /// Handle to a registered clock node
    NodeHandle,
    "clk"
);
