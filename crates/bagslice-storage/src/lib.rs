//! Bag storage for bagslice
//!
//! This crate provides the metadata provider, sequential reader and
//! sequential writer interfaces, a file-backed bag format and an
//! in-memory store.

pub mod bag;
mod error;
pub mod memory;
mod traits;

pub use bag::FileStore;
pub use error::StorageError;
pub use memory::{MemoryBag, MemoryStore};
pub use traits::{MetadataProvider, SequentialReader, SequentialWriter, Storage, StorageFilter};

// Re-export types used in our public API
pub use bagslice_types::{Channel, Record, TimeBounds};
