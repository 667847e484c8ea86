use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::{ecdsa, schnorr};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::Witness;

use crate::address::{AccountAddress, AddressPayload};
use crate::error::DeriveError;

/// A signature produced for one transaction input.
#[derive(Debug, Clone)]
pub enum Signature {
    /// ECDSA signature for legacy and segwit v0 inputs. Serialized as DER
    /// plus the SIGHASH_ALL byte.
    Ecdsa(ecdsa::Signature),
    /// BIP-340 Schnorr signature for taproot key-path inputs. Serialized as
    /// the 64-byte compact form; the default sighash appends no byte.
    Schnorr(schnorr::Signature),
}

impl Signature {
    fn form(&self) -> &'static str {
        match self {
            Signature::Ecdsa(_) => "ecdsa",
            Signature::Schnorr(_) => "schnorr",
        }
    }
}

fn der_with_hashtype(sig: &ecdsa::Signature) -> Vec<u8> {
    let mut bytes = sig.serialize_der().to_vec();
    bytes.push(EcdsaSighashType::All as u8);
    bytes
}

fn push_bytes(data: Vec<u8>) -> Result<PushBytesBuf, DeriveError> {
    PushBytesBuf::try_from(data)
        .map_err(|e| DeriveError::InvalidDerivation(format!("script push too large: {e}")))
}

impl AccountAddress {
    /// Build the input unlocking data (scriptSig and witness) for spending
    /// this address with the given signature.
    ///
    /// Legacy inputs carry everything in the scriptSig and leave the witness
    /// empty; native segwit inputs do the reverse; nested segwit pushes the
    /// redeem script as scriptSig and the signature data as witness.
    pub fn signature_script(
        &self,
        signature: &Signature,
    ) -> Result<(ScriptBuf, Witness), DeriveError> {
        let pubkey: [u8; 33] = self.key_config().public_key().to_bytes();

        match (self.payload(), signature) {
            (AddressPayload::P2pkh, Signature::Ecdsa(sig)) => {
                let script_sig = Builder::new()
                    .push_slice(push_bytes(der_with_hashtype(sig))?)
                    .push_slice(pubkey)
                    .into_script();
                Ok((script_sig, Witness::new()))
            }
            (AddressPayload::P2wpkhP2sh { redeem_script }, Signature::Ecdsa(sig)) => {
                let script_sig = Builder::new()
                    .push_slice(push_bytes(redeem_script.as_bytes().to_vec())?)
                    .into_script();
                let mut witness = Witness::new();
                witness.push(der_with_hashtype(sig));
                witness.push(pubkey);
                Ok((script_sig, witness))
            }
            (AddressPayload::P2wpkh, Signature::Ecdsa(sig)) => {
                let mut witness = Witness::new();
                witness.push(der_with_hashtype(sig));
                witness.push(pubkey);
                Ok((ScriptBuf::new(), witness))
            }
            (AddressPayload::P2tr { .. }, Signature::Schnorr(sig)) => {
                let mut witness = Witness::new();
                witness.push(sig.serialize());
                Ok((ScriptBuf::new(), witness))
            }
            (_, signature) => Err(DeriveError::IncompatibleSignatureForm(format!(
                "{} spend cannot use a {} signature",
                self.key_config().script_type(),
                signature.form()
            ))),
        }
    }
}
