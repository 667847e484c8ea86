use std::collections::BTreeMap;
use std::path::Path;

use bitcoin::block::Header;
use bitcoin::consensus::encode;
use bitcoin::pow::Work;
use parking_lot::RwLock;
use rocksdb::{Options, WriteBatch, DB};

use crate::error::StoreError;

/// A validated header together with the cumulative chain work up to and
/// including it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredHeader {
    pub header: Header,
    pub work: Work,
}

/// Persistence contract for the header chain.
///
/// The store holds a single contiguous run of headers starting at height 0.
/// It does no validation; the chain validator is the only writer and commits
/// whole batches, so implementations must apply each call atomically.
pub trait HeaderStore: Send + Sync {
    /// Height of the highest stored header, `None` when empty.
    fn tip_height(&self) -> Result<Option<u32>, StoreError>;

    fn get(&self, height: u32) -> Result<Option<StoredHeader>, StoreError>;

    /// Up to `limit` consecutive headers starting at `height`.
    fn scan_from(&self, height: u32, limit: u32) -> Result<Vec<StoredHeader>, StoreError>;

    /// Append `headers` at heights `first_height..`.
    fn append(&self, first_height: u32, headers: &[StoredHeader]) -> Result<(), StoreError>;

    /// Drop all headers at `height` and above, then append `headers` there.
    /// Both steps commit as one atomic write.
    fn replace_from(&self, height: u32, headers: &[StoredHeader]) -> Result<(), StoreError>;

    /// Drop all headers at `height` and above.
    fn truncate_from(&self, height: u32) -> Result<(), StoreError>;
}

// ─── In-memory store ───

/// Ephemeral store for tests and throwaway chains.
#[derive(Default)]
pub struct MemoryHeaderStore {
    headers: RwLock<BTreeMap<u32, StoredHeader>>,
}

impl MemoryHeaderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeaderStore for MemoryHeaderStore {
    fn tip_height(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.headers.read().keys().next_back().copied())
    }

    fn get(&self, height: u32) -> Result<Option<StoredHeader>, StoreError> {
        Ok(self.headers.read().get(&height).copied())
    }

    fn scan_from(&self, height: u32, limit: u32) -> Result<Vec<StoredHeader>, StoreError> {
        let headers = self.headers.read();
        let mut out = Vec::new();
        for h in height..height.saturating_add(limit) {
            match headers.get(&h) {
                Some(stored) => out.push(*stored),
                None => break,
            }
        }
        Ok(out)
    }

    fn append(&self, first_height: u32, headers: &[StoredHeader]) -> Result<(), StoreError> {
        let mut map = self.headers.write();
        for (i, stored) in headers.iter().enumerate() {
            map.insert(first_height + i as u32, *stored);
        }
        Ok(())
    }

    fn replace_from(&self, height: u32, headers: &[StoredHeader]) -> Result<(), StoreError> {
        let mut map = self.headers.write();
        map.split_off(&height);
        for (i, stored) in headers.iter().enumerate() {
            map.insert(height + i as u32, *stored);
        }
        Ok(())
    }

    fn truncate_from(&self, height: u32) -> Result<(), StoreError> {
        self.headers.write().split_off(&height);
        Ok(())
    }
}

// ─── RocksDB store ───

const HEADER_PREFIX: u8 = b'h';
const TIP_KEY: &[u8] = b"tip";

/// Record layout: 80-byte consensus-encoded header followed by the 32-byte
/// big-endian cumulative work.
const RECORD_LEN: usize = 80 + 32;

fn header_key(height: u32) -> [u8; 5] {
    let mut key = [HEADER_PREFIX; 5];
    key[1..].copy_from_slice(&height.to_be_bytes());
    key
}

fn encode_record(stored: &StoredHeader) -> Vec<u8> {
    let mut record = encode::serialize(&stored.header);
    record.extend_from_slice(&stored.work.to_be_bytes());
    record
}

fn decode_record(height: u32, record: &[u8]) -> Result<StoredHeader, StoreError> {
    if record.len() != RECORD_LEN {
        return Err(StoreError::Corrupted {
            height,
            reason: format!("record length {} instead of {RECORD_LEN}", record.len()),
        });
    }
    let header: Header = encode::deserialize(&record[..80]).map_err(|e| StoreError::Corrupted {
        height,
        reason: format!("header decode failed: {e}"),
    })?;
    let mut work_bytes = [0u8; 32];
    work_bytes.copy_from_slice(&record[80..]);
    Ok(StoredHeader {
        header,
        work: Work::from_be_bytes(work_bytes),
    })
}

/// Durable header store backed by RocksDB. The tip height lives under a
/// metadata key and is updated in the same write batch as the header
/// records, so a crash never leaves the tip pointing past the data.
pub struct RocksHeaderStore {
    db: DB,
}

impl RocksHeaderStore {
    /// Open (or create) the store at `path`. Failure here is fatal for the
    /// coin: there is nowhere to put synced headers.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)
            .map_err(|e| StoreError::Database(format!("failed to open {}: {e}", path.display())))?;
        Ok(RocksHeaderStore { db })
    }

    fn read_tip(&self) -> Result<Option<u32>, StoreError> {
        let raw = self
            .db
            .get(TIP_KEY)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(bytes) => {
                let bytes: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Database(format!("tip record has length {}", bytes.len()))
                })?;
                Ok(Some(u32::from_be_bytes(bytes)))
            }
        }
    }

    fn write_records(
        &self,
        batch: &mut WriteBatch,
        first_height: u32,
        headers: &[StoredHeader],
    ) {
        for (i, stored) in headers.iter().enumerate() {
            batch.put(header_key(first_height + i as u32), encode_record(stored));
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl HeaderStore for RocksHeaderStore {
    fn tip_height(&self) -> Result<Option<u32>, StoreError> {
        self.read_tip()
    }

    fn get(&self, height: u32) -> Result<Option<StoredHeader>, StoreError> {
        let raw = self
            .db
            .get(header_key(height))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(record) => Ok(Some(decode_record(height, &record)?)),
        }
    }

    fn scan_from(&self, height: u32, limit: u32) -> Result<Vec<StoredHeader>, StoreError> {
        let mut out = Vec::new();
        for h in height..height.saturating_add(limit) {
            match self.get(h)? {
                Some(stored) => out.push(stored),
                None => break,
            }
        }
        Ok(out)
    }

    fn append(&self, first_height: u32, headers: &[StoredHeader]) -> Result<(), StoreError> {
        if headers.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        self.write_records(&mut batch, first_height, headers);
        let new_tip = first_height + headers.len() as u32 - 1;
        batch.put(TIP_KEY, new_tip.to_be_bytes());
        self.commit(batch)
    }

    fn replace_from(&self, height: u32, headers: &[StoredHeader]) -> Result<(), StoreError> {
        let tip = match self.read_tip()? {
            Some(tip) => tip,
            None => return self.append(height, headers),
        };
        if headers.is_empty() && height > tip {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        let first_stale = height + headers.len() as u32;
        for h in first_stale..=tip {
            batch.delete(header_key(h));
        }
        self.write_records(&mut batch, height, headers);

        if headers.is_empty() && height == 0 {
            batch.delete(TIP_KEY);
        } else if headers.is_empty() {
            batch.put(TIP_KEY, (height - 1).to_be_bytes());
        } else {
            let new_tip = height + headers.len() as u32 - 1;
            batch.put(TIP_KEY, new_tip.to_be_bytes());
        }
        self.commit(batch)
    }

    fn truncate_from(&self, height: u32) -> Result<(), StoreError> {
        self.replace_from(height, &[])
    }
}
