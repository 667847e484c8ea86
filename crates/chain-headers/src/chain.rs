use bitcoin::block::Header;
use bitcoin::consensus::Params;
use bitcoin::hashes::Hash;
use bitcoin::pow::Work;
use bitcoin::{BlockHash, Network};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ChainError, StoreError};
use crate::store::{HeaderStore, StoredHeader};

/// Reorganizations rolling back more headers than this are rejected.
pub const DEFAULT_MAX_REORG_DEPTH: u32 = 100;

/// Snapshot of the chain's sync progress. Heights are `-1` while the store
/// is empty or no target has been reported yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub tip_height: i64,
    pub target_height: i64,
    pub synced: bool,
}

/// Result of reconciling an overlapping header batch with the stored chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgOutcome {
    /// The batch only extended the chain past the previous tip.
    Extended { new_tip: u32 },
    /// A competing branch with more cumulative work replaced the stored
    /// suffix starting at `fork_height`.
    Reorged {
        fork_height: u32,
        rolled_back: u32,
        new_tip: u32,
    },
    /// The batch carried nothing new, or a branch with no more cumulative
    /// work than the current tip. The store is unchanged.
    NotBetter,
}

struct Inner {
    store: Box<dyn HeaderStore>,
    target_height: i64,
}

/// Validated, persisted header chain.
///
/// All mutations go through a single write lock, so batches commit
/// all-or-nothing and readers never observe a half-applied batch.
pub struct HeaderChain {
    params: Params,
    max_reorg_depth: u32,
    inner: RwLock<Inner>,
}

impl HeaderChain {
    /// Wrap a store in a validator. The sync target starts unreported, so
    /// even a non-empty store reopened from disk counts as not synced until
    /// [`HeaderChain::set_target_height`] records a server-reported tip.
    pub fn new(store: Box<dyn HeaderStore>, network: Network, max_reorg_depth: u32) -> Self {
        HeaderChain {
            params: Params::new(network),
            max_reorg_depth,
            inner: RwLock::new(Inner {
                store,
                target_height: -1,
            }),
        }
    }

    pub fn max_reorg_depth(&self) -> u32 {
        self.max_reorg_depth
    }

    /// Record the best height reported by the remote tip subscription.
    pub fn set_target_height(&self, height: u32) {
        self.inner.write().target_height = i64::from(height);
    }

    pub fn status(&self) -> Result<SyncStatus, ChainError> {
        let inner = self.inner.read();
        let tip_height = inner.store.tip_height()?.map(i64::from).unwrap_or(-1);
        Ok(SyncStatus {
            tip_height,
            target_height: inner.target_height,
            synced: inner.target_height >= 0 && tip_height >= inner.target_height,
        })
    }

    /// The stored tip, if any.
    pub fn tip(&self) -> Result<Option<(u32, Header)>, ChainError> {
        let inner = self.inner.read();
        match inner.store.tip_height()? {
            None => Ok(None),
            Some(height) => {
                let stored = inner.store.get(height)?.ok_or(StoreError::Corrupted {
                    height,
                    reason: "tip record missing".into(),
                })?;
                Ok(Some((height, stored.header)))
            }
        }
    }

    /// Append a contiguous batch on top of the current tip.
    ///
    /// An empty store only accepts a batch starting at height 0 whose first
    /// header has an all-zero previous hash. The whole batch commits or
    /// nothing does.
    pub fn append_headers(&self, first_height: u32, headers: &[Header]) -> Result<(), ChainError> {
        if headers.is_empty() {
            return Ok(());
        }
        let inner = self.inner.write();

        let (expected, prev_hash, base_work) = match inner.store.tip_height()? {
            None => (0, BlockHash::all_zeros(), zero_work()),
            Some(tip) => {
                let stored = inner.store.get(tip)?.ok_or(StoreError::Corrupted {
                    height: tip,
                    reason: "tip record missing".into(),
                })?;
                (tip + 1, stored.header.block_hash(), stored.work)
            }
        };
        if first_height != expected {
            return Err(ChainError::Discontinuity {
                height: first_height,
                reason: format!("batch starts at {first_height}, expected {expected}"),
            });
        }

        let batch = self.validate_batch(first_height, prev_hash, base_work, headers)?;
        inner.store.append(first_height, &batch)?;
        debug!(first_height, count = headers.len(), "appended headers");
        Ok(())
    }

    /// Reconcile a batch overlapping already-stored heights with the chain.
    ///
    /// The longest prefix agreeing with stored headers is skipped; the rest
    /// is treated as a candidate branch. The branch is adopted, atomically
    /// replacing the stored suffix, only when its cumulative work strictly
    /// exceeds the current tip's. A divergence rolling back more than the
    /// safety bound fails without touching the store.
    pub fn reconcile(
        &self,
        first_height: u32,
        headers: &[Header],
    ) -> Result<ReorgOutcome, ChainError> {
        if headers.is_empty() {
            return Ok(ReorgOutcome::NotBetter);
        }
        let inner = self.inner.write();

        let tip = inner
            .store
            .tip_height()?
            .ok_or(ChainError::Discontinuity {
                height: first_height,
                reason: "store is empty".into(),
            })?;
        if first_height > tip {
            return Err(ChainError::Discontinuity {
                height: first_height,
                reason: format!("batch starts past the tip {tip}"),
            });
        }

        // First height where the incoming batch disagrees with the store.
        let mut fork = first_height;
        for (i, header) in headers.iter().enumerate() {
            let height = first_height + i as u32;
            if height > tip {
                break;
            }
            match inner.store.get(height)? {
                Some(stored) if stored.header.block_hash() == header.block_hash() => {
                    fork = height + 1
                }
                _ => break,
            }
        }

        let rolled_back = (tip + 1).saturating_sub(fork);
        if rolled_back > self.max_reorg_depth {
            return Err(ChainError::ReorgTooDeep {
                max_depth: self.max_reorg_depth,
                rolled_back,
            });
        }

        let new_headers = &headers[(fork - first_height) as usize..];
        if new_headers.is_empty() {
            return Ok(ReorgOutcome::NotBetter);
        }

        let (prev_hash, base_work) = if fork == 0 {
            (BlockHash::all_zeros(), zero_work())
        } else {
            let ancestor = inner.store.get(fork - 1)?.ok_or(StoreError::Corrupted {
                height: fork - 1,
                reason: "ancestor record missing".into(),
            })?;
            (ancestor.header.block_hash(), ancestor.work)
        };

        let batch = self.validate_batch(fork, prev_hash, base_work, new_headers)?;
        let branch_work = match batch.last() {
            Some(stored) => stored.work,
            None => return Ok(ReorgOutcome::NotBetter),
        };
        let new_tip = fork + batch.len() as u32 - 1;

        if fork > tip {
            inner.store.append(fork, &batch)?;
            debug!(new_tip, "reconcile extended the chain");
            return Ok(ReorgOutcome::Extended { new_tip });
        }

        let tip_work = inner
            .store
            .get(tip)?
            .ok_or(StoreError::Corrupted {
                height: tip,
                reason: "tip record missing".into(),
            })?
            .work;
        if branch_work <= tip_work {
            debug!(fork, "competing branch has no more work, keeping chain");
            return Ok(ReorgOutcome::NotBetter);
        }

        inner.store.replace_from(fork, &batch)?;
        info!(fork, rolled_back, new_tip, "reorganized header chain");
        Ok(ReorgOutcome::Reorged {
            fork_height: fork,
            rolled_back,
            new_tip,
        })
    }

    /// Check linkage and proof of work for a batch, producing the records
    /// to store with cumulative work filled in.
    fn validate_batch(
        &self,
        first_height: u32,
        prev_hash: BlockHash,
        base_work: Work,
        headers: &[Header],
    ) -> Result<Vec<StoredHeader>, ChainError> {
        let mut prev = prev_hash;
        let mut work = base_work;
        let mut batch = Vec::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let height = first_height + i as u32;
            if header.prev_blockhash != prev {
                return Err(ChainError::Discontinuity {
                    height,
                    reason: "previous hash mismatch".into(),
                });
            }
            self.check_pow(height, header)?;
            work = work + header.work();
            batch.push(StoredHeader {
                header: *header,
                work,
            });
            prev = header.block_hash();
        }
        Ok(batch)
    }

    /// The hash must meet the header's own declared target, and that target
    /// may not be weaker than the network's proof-of-work limit. Retarget
    /// schedule validation is out of scope for a headers-only client.
    fn check_pow(&self, height: u32, header: &Header) -> Result<(), ChainError> {
        if header.target() > self.params.max_attainable_target {
            return Err(ChainError::InvalidProofOfWork { height });
        }
        header
            .validate_pow(header.target())
            .map_err(|_| ChainError::InvalidProofOfWork { height })?;
        Ok(())
    }
}

fn zero_work() -> Work {
    Work::from_be_bytes([0u8; 32])
}
