//! Opinion MM Bot - Main Library
//!
//! Thin presentation crate over the `opinion` core library: binaries wire
//! configuration, accounts and the coordinator together and delegate all
//! trading logic to the core.

// Re-export the core workspace library for convenience
pub use opinion;
