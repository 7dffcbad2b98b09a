//! Shared types and utilities for Tracery
//!
//! This crate contains the address-range library, the id newtypes, the
//! decoded packet shapes and the table row types used by the processor and
//! the command-line interface.

pub mod address;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use address::{AddressRange, AddressRangeMap, AddressSet};
pub use types::{events::*, ids::*, profile::*};
