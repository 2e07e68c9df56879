//! Session orchestration.
//!
//! Covers endpoint allocation, the session registry, UI process
//! supervision, and the broker façade that ties them together.

pub mod allocator;
pub mod broker;
pub mod registry;
pub mod slot;
pub mod supervisor;
