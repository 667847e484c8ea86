//! Contract for the remote blockchain indexing service.
//!
//! The coin subsystem consumes this interface but does not implement it;
//! the concrete wire transport (Electrum-style JSON, SSL framing, server
//! failover) lives outside this workspace. Implementations must re-establish
//! all active subscriptions transparently after a reconnect and replay at
//! least the latest known state per subscription. The header validator
//! re-checks linkage on every delivery, so replays are harmless.

use bitcoin::block::Header;
use bitcoin::Txid;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Blockchain client failures. All recoverable: callers resume from their
/// last committed state once the client has reconnected.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Subscription identifier for an output script: the lowercase hex encoding
/// of the SHA-256 hash of the raw script bytes. Sent verbatim to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHashHex(String);

impl ScriptHashHex {
    /// Hash an output script into its subscription key.
    pub fn from_script(script: &[u8]) -> Self {
        ScriptHashHex(hex::encode(Sha256::digest(script)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScriptHashHex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A block header paired with the height the server reports for it.
/// Heights are not part of the 80-byte header encoding, so the server
/// supplies them out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipHeader {
    pub height: u32,
    pub header: Header,
}

/// One entry of an address history: a confirmed or mempool transaction
/// touching the subscribed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInfo {
    pub tx_hash: Txid,
    /// Confirmation height; `0` for unconfirmed.
    pub height: u32,
}

/// Fee rate in satoshi per kilo-vbyte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeRate(pub u64);

/// Callback invoked for every new best tip the server announces.
pub type HeaderCallback = Box<dyn Fn(TipHeader) + Send + Sync>;

/// Callback invoked with the server-reported status string of a subscribed
/// script hash. An empty status means the script has no on-chain history.
pub type StatusCallback = Box<dyn Fn(String) + Send + Sync>;

/// Capability interface of the remote indexing service.
///
/// Callbacks may fire concurrently from independent subscriptions; consumers
/// are responsible for serializing them before touching shared state.
pub trait BlockchainClient: Send + Sync {
    /// Subscribe to best-tip announcements. The current tip is delivered
    /// immediately, then every new tip as it appears.
    fn subscribe_headers(&self, callback: HeaderCallback) -> Result<(), ClientError>;

    /// Fetch up to `count` consecutive headers starting at `start_height`.
    /// Fewer headers (possibly zero) are returned near the server tip.
    fn get_headers(&self, start_height: u32, count: u32) -> Result<Vec<Header>, ClientError>;

    /// Subscribe to status changes of an output script.
    fn subscribe_script_hash(
        &self,
        script_hash: ScriptHashHex,
        callback: StatusCallback,
    ) -> Result<(), ClientError>;

    /// Fetch the ordered transaction history of an output script.
    fn get_history(&self, script_hash: &ScriptHashHex) -> Result<Vec<TxInfo>, ClientError>;

    /// Broadcast a raw transaction, returning its txid.
    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, ClientError>;

    /// Estimate the fee rate for confirmation within `target_blocks`.
    fn estimate_fee(&self, target_blocks: u32) -> Result<FeeRate, ClientError>;
}
