use std::str::FromStr;

use bitcoin::bip32::{DerivationPath, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::CompressedPublicKey;

use crate::error::DeriveError;

/// Output script kinds the derivation engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptType {
    /// Legacy pay-to-pubkey-hash.
    P2pkh,
    /// Pay-to-witness-pubkey-hash nested in pay-to-script-hash.
    P2wpkhP2sh,
    /// Native segwit v0 pay-to-witness-pubkey-hash.
    P2wpkh,
    /// Taproot (segwit v1) key-path spend.
    P2tr,
}

impl FromStr for ScriptType {
    type Err = DeriveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p2pkh" => Ok(ScriptType::P2pkh),
            "p2wpkh-p2sh" => Ok(ScriptType::P2wpkhP2sh),
            "p2wpkh" => Ok(ScriptType::P2wpkh),
            "p2tr" => Ok(ScriptType::P2tr),
            _ => Err(DeriveError::UnsupportedScriptType(s.to_string())),
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptType::P2pkh => write!(f, "p2pkh"),
            ScriptType::P2wpkhP2sh => write!(f, "p2wpkh-p2sh"),
            ScriptType::P2wpkh => write!(f, "p2wpkh"),
            ScriptType::P2tr => write!(f, "p2tr"),
        }
    }
}

/// An extended public key together with the absolute keypath it sits at and
/// the script type its addresses encode to.
///
/// Derivation is pure: the same configuration and relative path always yield
/// the same child configuration.
#[derive(Debug, Clone)]
pub struct KeyConfiguration {
    xpub: Xpub,
    keypath: DerivationPath,
    script_type: ScriptType,
}

impl KeyConfiguration {
    pub fn new(xpub: Xpub, keypath: DerivationPath, script_type: ScriptType) -> Self {
        KeyConfiguration {
            xpub,
            keypath,
            script_type,
        }
    }

    /// Derive a child configuration by a relative path of unhardened
    /// components. Hardened components are rejected: an extended public key
    /// cannot derive hardened children.
    pub fn derive(&self, relative: &DerivationPath) -> Result<KeyConfiguration, DeriveError> {
        if relative.into_iter().any(|child| child.is_hardened()) {
            return Err(DeriveError::InvalidDerivation(format!(
                "cannot derive hardened path {relative} from an extended public key"
            )));
        }

        let secp = Secp256k1::verification_only();
        let xpub = self
            .xpub
            .derive_pub(&secp, relative)
            .map_err(|e| DeriveError::InvalidDerivation(format!("bip32 derivation failed: {e}")))?;

        Ok(KeyConfiguration {
            xpub,
            keypath: self.keypath.extend(relative),
            script_type: self.script_type,
        })
    }

    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    /// Absolute keypath of this configuration's key.
    pub fn keypath(&self) -> &DerivationPath {
        &self.keypath
    }

    pub fn script_type(&self) -> ScriptType {
        self.script_type
    }

    /// The 33-byte compressed public key at this configuration's keypath.
    pub fn public_key(&self) -> CompressedPublicKey {
        self.xpub.to_pub()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-86 reference account xpub (m/86'/0'/0').
    const BIP86_ACCOUNT_XPUB: &str = "xpub6BgBgsespWvERF3LHQu6CnqdvfEvtMcQjYrcRzx53QJjSxarj2afYWcLteoGVky7D3UKDP9QyrLprQ3VCECoY49yfdDEHGCtMMj92pReUsQ";

    fn account_config() -> KeyConfiguration {
        let xpub: Xpub = BIP86_ACCOUNT_XPUB.parse().unwrap();
        let keypath: DerivationPath = "86'/0'/0'".parse().unwrap();
        KeyConfiguration::new(xpub, keypath, ScriptType::P2tr)
    }

    #[test]
    fn script_type_parse_all_variants() {
        assert_eq!("p2pkh".parse::<ScriptType>().unwrap(), ScriptType::P2pkh);
        assert_eq!(
            "p2wpkh-p2sh".parse::<ScriptType>().unwrap(),
            ScriptType::P2wpkhP2sh
        );
        assert_eq!("p2wpkh".parse::<ScriptType>().unwrap(), ScriptType::P2wpkh);
        assert_eq!("p2tr".parse::<ScriptType>().unwrap(), ScriptType::P2tr);
    }

    #[test]
    fn script_type_parse_unknown_fails() {
        let err = "p2wsh".parse::<ScriptType>().unwrap_err();
        assert!(matches!(err, DeriveError::UnsupportedScriptType(_)));
        assert_eq!(err.to_string(), "unsupported script type: p2wsh");
    }

    #[test]
    fn script_type_display_roundtrip() {
        for st in [
            ScriptType::P2pkh,
            ScriptType::P2wpkhP2sh,
            ScriptType::P2wpkh,
            ScriptType::P2tr,
        ] {
            assert_eq!(st.to_string().parse::<ScriptType>().unwrap(), st);
        }
    }

    #[test]
    fn derive_extends_keypath() {
        let config = account_config();
        let relative: DerivationPath = "0/5".parse().unwrap();
        let child = config.derive(&relative).unwrap();
        let expected: DerivationPath = "86'/0'/0'/0/5".parse().unwrap();
        assert_eq!(child.keypath(), &expected);
        assert_eq!(child.script_type(), ScriptType::P2tr);
    }

    #[test]
    fn derive_is_deterministic() {
        let config = account_config();
        let relative: DerivationPath = "1/0".parse().unwrap();
        let a = config.derive(&relative).unwrap();
        let b = config.derive(&relative).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn derive_distinct_indices_yield_distinct_keys() {
        let config = account_config();
        let a = config.derive(&"0/0".parse().unwrap()).unwrap();
        let b = config.derive(&"0/1".parse().unwrap()).unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn derive_hardened_is_rejected() {
        let config = account_config();
        let relative: DerivationPath = "0'/0".parse().unwrap();
        let err = config.derive(&relative).unwrap_err();
        assert!(matches!(err, DeriveError::InvalidDerivation(_)));
    }

    #[test]
    fn derive_empty_path_is_identity() {
        let config = account_config();
        let child = config.derive(&DerivationPath::master()).unwrap();
        assert_eq!(child.public_key(), config.public_key());
        assert_eq!(child.keypath(), config.keypath());
    }
}
