//! Shared byte buffers and region locators

mod region;

pub use region::{ByteRegion, SharedBuffer};
