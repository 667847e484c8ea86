use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use crate::error::DeriveError;

/// BIP-340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || msg)`.
pub fn tagged_hash(tag: &[u8], msg: &[u8]) -> [u8; 32] {
    let tag_digest = Sha256::digest(tag);
    let mut hasher = Sha256::new();
    hasher.update(tag_digest);
    hasher.update(tag_digest);
    hasher.update(msg);
    hasher.finalize().into()
}

/// Compute the BIP-341 key-path output key for an internal public key with
/// no script tree.
///
/// The x-only conversion normalizes the internal key to its even-Y form
/// before tweaking. The returned key is x-only; its parity plays no further
/// role in the address, since the witness program is the 32-byte x-only
/// serialization.
pub fn tweaked_output_key(pubkey: &PublicKey) -> Result<XOnlyPublicKey, DeriveError> {
    let secp = Secp256k1::verification_only();
    let (internal, _parity) = pubkey.x_only_public_key();

    let tweak = tagged_hash(b"TapTweak", &internal.serialize());
    let scalar = Scalar::from_be_bytes(tweak)
        .map_err(|e| DeriveError::InvalidDerivation(format!("taproot tweak out of range: {e}")))?;

    let (output, _output_parity) = internal
        .add_tweak(&secp, &scalar)
        .map_err(|e| DeriveError::InvalidDerivation(format!("taproot tweak failed: {e}")))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_hash_is_deterministic() {
        let a = tagged_hash(b"TapTweak", &[1, 2, 3]);
        let b = tagged_hash(b"TapTweak", &[1, 2, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn tagged_hash_differs_per_tag() {
        let a = tagged_hash(b"TapTweak", &[1, 2, 3]);
        let b = tagged_hash(b"TapBranch", &[1, 2, 3]);
        assert_ne!(a, b);
    }

    #[test]
    fn tagged_hash_differs_per_message() {
        let a = tagged_hash(b"TapTweak", &[1, 2, 3]);
        let b = tagged_hash(b"TapTweak", &[1, 2, 4]);
        assert_ne!(a, b);
    }

    /// BIP-86 first receiving key (m/86'/0'/0'/0/0). The public key has an
    /// odd Y coordinate, so the tweak must operate on its even-Y form.
    #[test]
    fn bip86_output_key_vector() {
        let pubkey: PublicKey =
            "03cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115"
                .parse()
                .unwrap();
        let output = tweaked_output_key(&pubkey).unwrap();
        assert_eq!(
            hex::encode(output.serialize()),
            "a82f29944d65b86ae6b5e5cc75e294ead6c59391a1edc5e016e3498c67fc7bbb"
        );
    }

    /// Keys differing only in the parity byte tweak to the same output key:
    /// the internal key is normalized to even Y first.
    #[test]
    fn parity_byte_does_not_affect_output_key() {
        let even: PublicKey =
            "02cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115"
                .parse()
                .unwrap();
        let odd: PublicKey =
            "03cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115"
                .parse()
                .unwrap();
        assert_eq!(
            tweaked_output_key(&even).unwrap(),
            tweaked_output_key(&odd).unwrap()
        );
    }

    #[test]
    fn negating_a_point_twice_is_the_identity() {
        let secp = Secp256k1::verification_only();
        let odd: PublicKey =
            "03cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115"
                .parse()
                .unwrap();
        assert_eq!(odd.negate(&secp).negate(&secp), odd);
    }

    #[test]
    fn distinct_keys_tweak_to_distinct_output_keys() {
        let a: PublicKey = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
            .parse()
            .unwrap();
        let b: PublicKey = "02cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115"
            .parse()
            .unwrap();
        assert_ne!(tweaked_output_key(&a).unwrap(), tweaked_output_key(&b).unwrap());
    }
}
