//! Address-range primitives shared by the stack-profile, mapping-version and
//! JIT code trackers.

mod range;
mod range_map;
mod set;

pub use range::{AddressRange, RangeError};
pub use range_map::AddressRangeMap;
pub use set::AddressSet;
