#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! Signing primitives for the reward-claim calculator: BLAKE3 hashing
//! utilities and the secp256k1 ECDSA signer used to authorize claims.

pub mod blake3_ops;
pub mod secp256k1_ops;

pub use blake3_ops::*;
pub use secp256k1_ops::*;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
