use reward_types::{
    EcdsaSignature, EthAddress, RewardError, RewardResult, Secp256k1PrivateKey,
    Secp256k1PublicKey, SECP256K1_PRIVATE_KEY_SIZE,
};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

thread_local! {
    static SECP256K1_CTX: Secp256k1<secp256k1::All> = Secp256k1::new();
}

pub fn generate_private_key() -> Secp256k1PrivateKey {
    let bytes = crate::random_bytes::<SECP256K1_PRIVATE_KEY_SIZE>();
    Secp256k1PrivateKey::from_bytes(bytes)
}

pub fn derive_public_key(private_key: &Secp256k1PrivateKey) -> RewardResult<Secp256k1PublicKey> {
    SECP256K1_CTX.with(|ctx| {
        let secret = SecretKey::from_slice(&private_key.0)
            .map_err(|e| RewardError::InvalidKey(e.to_string()))?;
        let public = PublicKey::from_secret_key(ctx, &secret);
        let serialized = public.serialize();
        Ok(Secp256k1PublicKey::from_bytes(serialized))
    })
}

pub fn derive_eth_address(public_key: &Secp256k1PublicKey) -> RewardResult<EthAddress> {
    SECP256K1_CTX.with(|_ctx| {
        let pubkey = PublicKey::from_slice(&public_key.0)
            .map_err(|e| RewardError::InvalidKey(e.to_string()))?;

        let uncompressed = pubkey.serialize_uncompressed();

        let hash = Keccak256::digest(&uncompressed[1..]);

        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);

        Ok(EthAddress::from_bytes(address))
    })
}

pub fn derive_eth_address_from_private(
    private_key: &Secp256k1PrivateKey,
) -> RewardResult<EthAddress> {
    let public_key = derive_public_key(private_key)?;
    derive_eth_address(&public_key)
}

pub fn sign_message(
    private_key: &Secp256k1PrivateKey,
    message_hash: &[u8; 32],
) -> RewardResult<EcdsaSignature> {
    SECP256K1_CTX.with(|ctx| {
        let secret = SecretKey::from_slice(&private_key.0)
            .map_err(|e| RewardError::InvalidKey(e.to_string()))?;
        let message = Message::from_digest_slice(message_hash)
            .map_err(|e| RewardError::Crypto(e.to_string()))?;

        let (recovery_id, signature) = ctx
            .sign_ecdsa_recoverable(&message, &secret)
            .serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&signature[..32]);
        s.copy_from_slice(&signature[32..]);

        let v = recovery_id.to_i32() as u8 + 27;

        Ok(EcdsaSignature::new(r, s, v))
    })
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Digest over `(chainId, rewardContractAddress, userAddress, cumulativeAuthorizedUnits, nonce)`,
/// contract-compatible: each field is left-padded to 32 bytes and keccak256'd in sequence,
/// matching `abi.encodePacked` semantics the claim contract uses to re-derive the same hash.
pub fn claim_authorization_digest(
    chain_id: u64,
    reward_contract: &EthAddress,
    user_address: &EthAddress,
    cumulative_authorized_units: u128,
    nonce: u64,
) -> [u8; 32] {
    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(&[0u8; 24]);
    buf.extend_from_slice(&chain_id.to_be_bytes());
    buf.extend_from_slice(&[0u8; 12]);
    buf.extend_from_slice(reward_contract.as_bytes());
    buf.extend_from_slice(&[0u8; 12]);
    buf.extend_from_slice(user_address.as_bytes());
    buf.extend_from_slice(&[0u8; 16]);
    buf.extend_from_slice(&cumulative_authorized_units.to_be_bytes());
    buf.extend_from_slice(&[0u8; 24]);
    buf.extend_from_slice(&nonce.to_be_bytes());
    keccak256(&buf)
}

pub fn validate_private_key(key: &[u8; 32]) -> bool {
    SecretKey::from_slice(key).is_ok()
}

pub fn validate_public_key(key: &[u8; 33]) -> bool {
    PublicKey::from_slice(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_and_derivation() {
        let private_key = generate_private_key();
        let public_key = derive_public_key(&private_key).unwrap();
        let address = derive_eth_address(&public_key).unwrap();

        let hex = address.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 42);
    }

    #[test]
    fn test_sign_message_is_deterministic_per_key() {
        let private_key = generate_private_key();
        let message_hash = keccak256(b"reward claim transaction data");

        let sig1 = sign_message(&private_key, &message_hash).unwrap();
        let sig2 = sign_message(&private_key, &message_hash).unwrap();
        assert_eq!(sig1.r, sig2.r);
        assert_eq!(sig1.s, sig2.s);
    }

    #[test]
    fn test_key_validation() {
        let valid = [1u8; 32];
        assert!(validate_private_key(&valid));

        let zero = [0u8; 32];
        assert!(!validate_private_key(&zero));
    }
}
