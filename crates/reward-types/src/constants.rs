pub const BLAKE3_HASH_SIZE: usize = 32;
pub const BLAKE3_KEY_SIZE: usize = 32;

pub const SECP256K1_PRIVATE_KEY_SIZE: usize = 32;
pub const SECP256K1_PUBLIC_KEY_SIZE: usize = 33;
pub const SECP256K1_PUBLIC_KEY_UNCOMPRESSED_SIZE: usize = 65;
pub const SECP256K1_SIGNATURE_SIZE: usize = 72;

pub const ETH_ADDRESS_SIZE: usize = 20;

/// Decimals of the reward token's native on-chain unit (18, like most ERC-20s).
pub const REWARD_TOKEN_DECIMALS: u8 = 18;

/// Decimals used for USD-denominated fixed-point amounts (prices, TVL, APR bases).
pub const USD_DECIMALS: u8 = 6;

/// Length of a reward epoch: 24 hours, aligned to program start.
pub const EPOCH_DURATION_SECS: u64 = 86_400;
