//! Data types shared across the workspace

pub mod events;
pub mod ids;
pub mod profile;
