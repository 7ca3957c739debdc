//! Persistence Adapters
//!
//! Implementations of the book store port.

pub mod in_memory;
pub mod jsonl;

pub use in_memory::InMemoryBookStore;
pub use jsonl::JsonlBookStore;
