//! Executors for compiled query predicates.

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
