//! Entity identifiers
//!
//! Every named entity in a [`Core`](super::Core) module carries an opaque
//! integer id, allocated by a monotonic counter. Ids never repeat and are
//! never reused.

use std::fmt;

macro_rules! core_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an id from a raw index
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get the raw index
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

core_id!(
    /// Id of a user-declared or builtin algebraic type
    TypeId,
    "type_"
);
core_id!(
    /// Id of a constructor of an algebraic type
    CtorId,
    "ctor_"
);
core_id!(
    /// Id of a function
    FuncId,
    "func_"
);
core_id!(
    /// Id of a resource
    ResourceId,
    "res_"
);
