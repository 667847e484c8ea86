//! Headers-only chain tracking.
//!
//! Persists a contiguous run of Bitcoin block headers, validates linkage
//! and proof of work on every appended batch, handles reorganizations up to
//! a safety depth, and keeps the chain caught up with the tips a remote
//! indexing service announces.

pub mod chain;
pub mod error;
pub mod store;
pub mod sync;
pub mod testing;

pub use chain::{HeaderChain, ReorgOutcome, SyncStatus, DEFAULT_MAX_REORG_DEPTH};
pub use error::{ChainError, StoreError};
pub use store::{HeaderStore, MemoryHeaderStore, RocksHeaderStore, StoredHeader};
pub use sync::{HeaderEvent, Headers, DEFAULT_BATCH_SIZE};
