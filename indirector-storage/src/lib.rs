//! Indirector Storage
//!
//! Local terminus implementations:
//! - [`MemoryTerminus`]: in-process map, the default cache class
//! - [`CachingTerminus`]: cache layering over any primary terminus
//! - [`StoreTerminus`]: row-oriented persistent store with collection merge

pub mod cache_terminus;
pub mod memory;
pub mod store;

pub use cache_terminus::CachingTerminus;
pub use memory::{MemoryTerminus, MEMORY_TERMINUS};
pub use store::{
    diff_rows, ChangeSet, MemoryRecordStore, Persistable, RecordStore, Rows, StoreTerminus,
    STORE_TERMINUS,
};
