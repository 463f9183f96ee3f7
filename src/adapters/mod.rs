//! Adapters implementing the port traits.

pub mod ai;
pub mod cache;
pub mod memory;
pub mod sqlite;
