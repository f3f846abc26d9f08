//! CLI command implementations.

pub mod list;
pub mod serve;
pub mod upload;
pub mod verify;
