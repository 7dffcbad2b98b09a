//! Row identifiers
//!
//! Every table hands out dense ids starting at zero, in insertion order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversion between a typed id and its row index.
pub trait RowId: Copy + Eq + std::hash::Hash + fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl RowId for $name {
            fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Interned string. Id 0 is always the empty string.
    StringId
);
row_id!(
    /// Row of the stack profile mapping table
    MappingId
);
row_id!(
    /// Row of the stack profile frame table
    FrameId
);
row_id!(
    /// Row of the stack profile callsite table
    CallsiteId
);
row_id!(
    /// Group of symbol rows attached to one frame
    SymbolSetId
);
row_id!(UniquePid);
row_id!(UniqueTid);
row_id!(HeapGraphClassId);
row_id!(HeapGraphObjectId);
row_id!(HeapGraphReferenceId);

impl StringId {
    pub const EMPTY: StringId = StringId(0);

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

/// Identifier of a packet sequence, as assigned by the producer.
pub type SequenceId = u32;

/// Sequence-local interning id.
pub type InternId = u64;

pub type SourceMappingId = InternId;
pub type SourceFrameId = InternId;
pub type SourceCallstackId = InternId;
pub type SourceStringId = InternId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_round_trip_index() {
        let id = FrameId::from_index(42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_empty_string_id() {
        assert!(StringId::EMPTY.is_empty());
        assert!(!StringId(3).is_empty());
    }
}
