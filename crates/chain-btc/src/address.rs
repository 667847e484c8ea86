use bitcoin::address::Address;
use bitcoin::key::TweakedPublicKey;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::XOnlyPublicKey;
use bitcoin::CompressedPublicKey;
use blockchain_client::ScriptHashHex;

use crate::error::DeriveError;
use crate::keys::{KeyConfiguration, ScriptType};
use crate::network::BtcNetwork;
use crate::taproot;

/// Script-type specific data carried alongside a derived address. Only the
/// nested-segwit form needs its redeem script at spend time, and only
/// taproot needs the tweaked output key.
#[derive(Debug, Clone)]
pub enum AddressPayload {
    P2pkh,
    P2wpkhP2sh { redeem_script: ScriptBuf },
    P2wpkh,
    P2tr { output_key: XOnlyPublicKey },
}

/// Build the address and payload for a public key under a script type.
pub fn payload_for_key(
    script_type: ScriptType,
    public_key: &CompressedPublicKey,
    network: BtcNetwork,
) -> Result<(Address, AddressPayload), DeriveError> {
    let net = network.to_bitcoin_network();
    match script_type {
        ScriptType::P2pkh => {
            let address = Address::p2pkh(public_key.pubkey_hash(), net);
            Ok((address, AddressPayload::P2pkh))
        }
        ScriptType::P2wpkhP2sh => {
            let redeem_script = ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash());
            let address = Address::p2sh(&redeem_script, net).map_err(|e| {
                DeriveError::InvalidDerivation(format!("p2sh wrapping failed: {e}"))
            })?;
            Ok((address, AddressPayload::P2wpkhP2sh { redeem_script }))
        }
        ScriptType::P2wpkh => {
            let address = Address::p2wpkh(public_key, net);
            Ok((address, AddressPayload::P2wpkh))
        }
        ScriptType::P2tr => {
            let output_key = taproot::tweaked_output_key(&public_key.0)?;
            let address = Address::p2tr_tweaked(
                TweakedPublicKey::dangerous_assume_tweaked(output_key),
                net,
            );
            Ok((address, AddressPayload::P2tr { output_key }))
        }
    }
}

/// Derive the address at `relative` under an account configuration.
pub fn derive_address(
    account: &KeyConfiguration,
    relative: &bitcoin::bip32::DerivationPath,
    network: BtcNetwork,
) -> Result<AccountAddress, DeriveError> {
    AccountAddress::new(account.derive(relative)?, network)
}

/// A single derived receive or change address of an account.
///
/// The address keeps the key configuration it was derived from, so spend
/// scripts can be produced later without re-deriving, plus the latest
/// history status string reported by the indexing service. An empty status
/// means the address has never appeared on chain.
#[derive(Debug, Clone)]
pub struct AccountAddress {
    address: Address,
    key_config: KeyConfiguration,
    payload: AddressPayload,
    history_status: String,
}

impl AccountAddress {
    /// Derive the address for a key configuration on the given network.
    pub fn new(key_config: KeyConfiguration, network: BtcNetwork) -> Result<Self, DeriveError> {
        let (address, payload) =
            payload_for_key(key_config.script_type(), &key_config.public_key(), network)?;
        Ok(AccountAddress {
            address,
            key_config,
            payload,
            history_status: String::new(),
        })
    }

    /// Identifier of this address for subscription and bookkeeping purposes.
    pub fn id(&self) -> ScriptHashHex {
        self.script_hash_hex()
    }

    /// The human-readable encoded address.
    pub fn encode(&self) -> String {
        self.address.to_string()
    }

    /// The output script locking funds to this address.
    pub fn pubkey_script(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    /// Hex-encoded SHA-256 of the output script, the key under which the
    /// indexing service tracks this address.
    pub fn script_hash_hex(&self) -> ScriptHashHex {
        ScriptHashHex::from_script(self.pubkey_script().as_bytes())
    }

    pub fn key_config(&self) -> &KeyConfiguration {
        &self.key_config
    }

    pub fn payload(&self) -> &AddressPayload {
        &self.payload
    }

    /// Whether the address has any on-chain history.
    pub fn is_used(&self) -> bool {
        !self.history_status.is_empty()
    }

    pub fn history_status(&self) -> &str {
        &self.history_status
    }

    /// Record the latest history status reported for this address.
    pub fn set_history_status(&mut self, status: String) {
        self.history_status = status;
    }

    /// The script to commit to when computing the signature hash for an
    /// input spending this address, plus whether the segwit signing
    /// algorithm applies.
    ///
    /// Taproot inputs return an empty script: the BIP-341 signature hash
    /// commits to the full prevout set instead of a script code.
    pub fn script_for_hash_to_sign(&self) -> (bool, ScriptBuf) {
        match &self.payload {
            AddressPayload::P2pkh => (false, self.pubkey_script()),
            AddressPayload::P2wpkhP2sh { redeem_script } => (true, redeem_script.clone()),
            AddressPayload::P2wpkh => (true, self.pubkey_script()),
            AddressPayload::P2tr { .. } => (true, ScriptBuf::new()),
        }
    }
}
