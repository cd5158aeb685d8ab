//! Core identifier types
//!
//! Every entity the pipeline touches is addressed by a positive integer id.
//! Ids are allocated by the catalog from monotonic counters, so a newer
//! entity always has a strictly larger id than an older one of the same kind.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id value
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw id value
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

entity_id!(
    /// Identifier of a test (the entity that owns runs)
    TestId
);
entity_id!(
    /// Identifier of an uploaded run
    RunId
);
entity_id!(
    /// Identifier of a dataset; never reused, even across recalculation
    DatasetId
);
entity_id!(
    /// Identifier of a registered schema
    SchemaId
);
entity_id!(
    /// Identifier of a transformer
    TransformerId
);
entity_id!(
    /// Identifier of a label
    LabelId
);

/// Reference to a test either by id or by unique name
///
/// Uploads name their test the way a client would: usually by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestRef {
    /// Numeric test id
    Id(TestId),
    /// Unique test name
    Name(String),
}

impl From<TestId> for TestRef {
    fn from(id: TestId) -> Self {
        TestRef::Id(id)
    }
}

impl From<&str> for TestRef {
    fn from(name: &str) -> Self {
        TestRef::Name(name.to_string())
    }
}

impl From<String> for TestRef {
    fn from(name: String) -> Self {
        TestRef::Name(name)
    }
}

impl fmt::Display for TestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestRef::Id(id) => write!(f, "#{}", id),
            TestRef::Name(name) => write!(f, "{}", name),
        }
    }
}
