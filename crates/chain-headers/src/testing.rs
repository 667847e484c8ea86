//! Test fixtures: deterministic regtest header mining and an in-process
//! mock of the blockchain client.
//!
//! Mined headers carry real regtest-difficulty proof of work (the nonce is
//! ground until the hash meets the declared target), so validation paths
//! run unmodified in tests.

use std::collections::HashMap;

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, CompactTarget, TxMerkleNode};
use parking_lot::Mutex;

use blockchain_client::{
    BlockchainClient, ClientError, FeeRate, HeaderCallback, ScriptHashHex, StatusCallback,
    TipHeader, TxInfo,
};

/// Regtest difficulty bits. About half of all hashes meet this target, so
/// grinding takes a couple of attempts per header.
pub const REGTEST_BITS: u32 = 0x207fffff;

const TIME_BASE: u32 = 1_600_000_000;

/// Mine one header on top of `prev_blockhash` with the given timestamp.
pub fn mine_header(prev_blockhash: BlockHash, time: u32) -> Header {
    let mut header = Header {
        version: Version::from_consensus(4),
        prev_blockhash,
        merkle_root: TxMerkleNode::all_zeros(),
        time,
        bits: CompactTarget::from_consensus(REGTEST_BITS),
        nonce: 0,
    };
    while header.validate_pow(header.target()).is_err() {
        header.nonce += 1;
    }
    header
}

/// Mine `len` headers starting from an all-zero previous hash at height 0.
/// Deterministic: the same length always yields the same headers.
pub fn mine_chain(len: u32) -> Vec<Header> {
    extend_from(BlockHash::all_zeros(), len, 0)
}

/// Mine `len` headers on top of `parent`. Distinct `time_salt` values yield
/// distinct sibling branches from the same parent.
pub fn extend_chain(parent: &Header, len: u32, time_salt: u32) -> Vec<Header> {
    extend_from(parent.block_hash(), len, time_salt)
}

fn extend_from(mut prev: BlockHash, len: u32, time_salt: u32) -> Vec<Header> {
    let mut headers = Vec::with_capacity(len as usize);
    for i in 0..len {
        let header = mine_header(prev, TIME_BASE + time_salt + i);
        prev = header.block_hash();
        headers.push(header);
    }
    headers
}

// ─── Mock client ───

struct MockState {
    headers: Vec<Header>,
    header_subs: Vec<HeaderCallback>,
    script_subs: HashMap<ScriptHashHex, Vec<StatusCallback>>,
}

/// In-process `BlockchainClient` serving a scripted chain of headers.
///
/// Tests drive it by extending or reorganizing the served chain and calling
/// [`MockClient::announce`] to push the new tip to subscribers, mimicking
/// the server's tip notifications.
pub struct MockClient {
    state: Mutex<MockState>,
}

impl MockClient {
    pub fn new(headers: Vec<Header>) -> Self {
        MockClient {
            state: Mutex::new(MockState {
                headers,
                header_subs: Vec::new(),
                script_subs: HashMap::new(),
            }),
        }
    }

    /// Push the current tip to all header subscribers.
    pub fn announce(&self) {
        let state = self.state.lock();
        if let Some(header) = state.headers.last() {
            let tip = TipHeader {
                height: state.headers.len() as u32 - 1,
                header: *header,
            };
            for callback in &state.header_subs {
                callback(tip);
            }
        }
    }

    /// Grow the served chain.
    pub fn extend(&self, more: &[Header]) {
        self.state.lock().headers.extend_from_slice(more);
    }

    /// Replace the served chain from `height` on with a competing branch.
    pub fn reorg_to(&self, height: u32, branch: &[Header]) {
        let mut state = self.state.lock();
        state.headers.truncate(height as usize);
        state.headers.extend_from_slice(branch);
    }

    /// Report a new history status for a subscribed script hash.
    pub fn set_script_status(&self, script_hash: &ScriptHashHex, status: &str) {
        let state = self.state.lock();
        if let Some(callbacks) = state.script_subs.get(script_hash) {
            for callback in callbacks {
                callback(status.to_string());
            }
        }
    }
}

impl BlockchainClient for MockClient {
    fn subscribe_headers(&self, callback: HeaderCallback) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if let Some(header) = state.headers.last() {
            callback(TipHeader {
                height: state.headers.len() as u32 - 1,
                header: *header,
            });
        }
        state.header_subs.push(callback);
        Ok(())
    }

    fn get_headers(&self, start_height: u32, count: u32) -> Result<Vec<Header>, ClientError> {
        let state = self.state.lock();
        let start = start_height as usize;
        if start >= state.headers.len() {
            return Ok(Vec::new());
        }
        let end = (start + count as usize).min(state.headers.len());
        Ok(state.headers[start..end].to_vec())
    }

    fn subscribe_script_hash(
        &self,
        script_hash: ScriptHashHex,
        callback: StatusCallback,
    ) -> Result<(), ClientError> {
        self.state
            .lock()
            .script_subs
            .entry(script_hash)
            .or_default()
            .push(callback);
        Ok(())
    }

    fn get_history(&self, _script_hash: &ScriptHashHex) -> Result<Vec<TxInfo>, ClientError> {
        Ok(Vec::new())
    }

    fn broadcast(&self, _raw_tx: &[u8]) -> Result<bitcoin::Txid, ClientError> {
        Err(ClientError::Request(
            "broadcast is not supported by the mock client".into(),
        ))
    }

    fn estimate_fee(&self, _target_blocks: u32) -> Result<FeeRate, ClientError> {
        Ok(FeeRate(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mined_chain_links_and_meets_target() {
        let headers = mine_chain(4);
        assert!(headers[0].prev_blockhash == BlockHash::all_zeros());
        for pair in headers.windows(2) {
            assert_eq!(pair[1].prev_blockhash, pair[0].block_hash());
        }
        for header in &headers {
            assert!(header.validate_pow(header.target()).is_ok());
        }
    }

    #[test]
    fn mining_is_deterministic() {
        assert_eq!(mine_chain(3), mine_chain(3));
    }

    #[test]
    fn sibling_branches_differ() {
        let headers = mine_chain(2);
        let a = extend_chain(&headers[1], 2, 100);
        let b = extend_chain(&headers[1], 2, 200);
        assert_eq!(a[0].prev_blockhash, b[0].prev_blockhash);
        assert_ne!(a[0].block_hash(), b[0].block_hash());
    }

    #[test]
    fn mock_serves_header_slices() {
        let client = MockClient::new(mine_chain(5));
        assert_eq!(client.get_headers(0, 3).unwrap().len(), 3);
        assert_eq!(client.get_headers(3, 10).unwrap().len(), 2);
        assert!(client.get_headers(5, 10).unwrap().is_empty());
    }

    #[test]
    fn mock_announces_tip_on_subscribe() {
        let client = MockClient::new(mine_chain(3));
        let (tx, rx) = std::sync::mpsc::channel();
        client
            .subscribe_headers(Box::new(move |tip| {
                let _ = tx.send(tip);
            }))
            .unwrap();
        let tip = rx.try_recv().unwrap();
        assert_eq!(tip.height, 2);
    }

    #[test]
    fn mock_reorg_replaces_suffix() {
        let headers = mine_chain(5);
        let client = MockClient::new(headers.clone());
        let branch = extend_chain(&headers[2], 3, 500);
        client.reorg_to(3, &branch);

        let served = client.get_headers(0, 10).unwrap();
        assert_eq!(served.len(), 6);
        assert_eq!(served[..3], headers[..3]);
        assert_eq!(served[3..], branch[..]);
    }
}
