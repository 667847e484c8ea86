//! Bitcoin script and address derivation.
//!
//! Derives P2PKH, P2WPKH-in-P2SH, P2WPKH, and P2TR addresses from extended
//! public keys, and produces the per-input unlocking data needed to spend
//! them. Everything here is pure: no I/O, no clocks, no randomness.

pub mod address;
pub mod error;
pub mod keys;
pub mod network;
pub mod spend;
pub mod taproot;

pub use address::{derive_address, AccountAddress, AddressPayload};
pub use error::DeriveError;
pub use keys::{KeyConfiguration, ScriptType};
pub use network::BtcNetwork;
pub use spend::Signature;
