//! Stack profile interning and heap profile assembly

pub mod address_space;
pub mod heap_profile;
pub mod package;
pub mod registry;
pub mod sequence_tracker;
pub mod symbols;

pub use address_space::{MappingVersion, VirtualAddressSpace, VirtualAddressSpaceBuilder};
pub use heap_profile::{HeapProfileTracker, SourceAllocation};
pub use package::{package_from_location, PackageLocation};
pub use registry::{NameInPackage, StackProfileRegistry};
pub use sequence_tracker::{InternLookup, InternedStringKind, SequenceStackProfileTracker};
