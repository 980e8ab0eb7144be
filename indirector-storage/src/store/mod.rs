//! Persistent-store terminus.
//!
//! Objects are kept as named rows per `(kind, key)` record. Saving reconciles
//! the submitted object's rows with the stored ones and commits the
//! difference atomically.

pub mod merge;
pub mod record;
pub mod terminus;

pub use merge::{diff_rows, ChangeSet, Rows};
pub use record::{MemoryRecordStore, RecordStore};
pub use terminus::{Persistable, StoreTerminus, STORE_TERMINUS};
