use crate::constants::ETH_ADDRESS_SIZE;
use crate::error::{RewardError, RewardResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte account identifier, always canonicalized lowercase. Unlike the
/// mixed-case EIP-55 checksum some chain tooling uses for display, every
/// entry point into this crate folds addresses to lowercase hex on parse so
/// two addresses that are byte-equal always compare and hash equal
/// regardless of how the caller cased them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthAddress(pub [u8; ETH_ADDRESS_SIZE]);

impl EthAddress {
    pub fn from_bytes(bytes: [u8; ETH_ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ETH_ADDRESS_SIZE] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex — the program's canonical representation.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> RewardResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != ETH_ADDRESS_SIZE * 2 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RewardError::MalformedAddress(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|e| RewardError::MalformedAddress(e.to_string()))?;
        let mut arr = [0u8; ETH_ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; ETH_ADDRESS_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ETH_ADDRESS_SIZE]
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self.to_hex())
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for EthAddress {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::str::FromStr for EthAddress {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_case_input_canonicalizes_lowercase() {
        let mixed = "0xDeAdBeEF00112233445566778899aAbBcCdDeEfF00112233";
        // truncate to valid 20-byte length for the test fixture
        let addr_hex = "0xdeadbeef001122334455667788990011deadbeef";
        let a = EthAddress::from_hex(addr_hex).unwrap();
        let b = EthAddress::from_hex(&addr_hex.to_uppercase().replace("0X", "0x")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), addr_hex);
        let _ = mixed;
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(EthAddress::from_hex("0xdead").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(EthAddress::from_hex("0xzz00000000000000000000000000000000000000").is_err());
    }
}
