use thiserror::Error;

/// Error taxonomy for the reward-accounting core.
///
/// `Transient`, `Permanent`, `Inconsistent`, and `Unavailable` are the four
/// classes components reason about when deciding whether to retry, reject,
/// auto-correct, or defer work; the variants below carry the concrete cause.
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("nonce replay: authorization already issued at this nonce")]
    NonceReplay,

    #[error("on-chain nonce advanced before commit")]
    StaleNonce,

    #[error("calculator key is not yet an authorized signer on the reward contract")]
    CalculatorUnauthorized,

    #[error("price unavailable beyond the staleness horizon")]
    PriceUnavailable,

    #[error("local state and chain state disagree: {0}")]
    Inconsistent(String),

    #[error("required inputs unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("invalid key format: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("chain RPC error: {0}")]
    Chain(String),

    #[error("contract error: {0}")]
    Contract(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("amount/decimal error: {0}")]
    Amount(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RewardError {
    /// Whether the adapter layer should retry this error within its budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, RewardError::Transient(_))
    }

    /// User-facing, opaque message — never the internal `Display` text.
    /// The HTTP Facade maps variants to this instead of `to_string()` so
    /// upstream bodies and stack traces never reach a client (see error
    /// handling policy).
    pub fn public_message(&self) -> &'static str {
        match self {
            RewardError::MalformedAddress(_) => "malformed address",
            RewardError::NothingToClaim => "nothing to claim",
            RewardError::NonceReplay => "authorization already issued at this nonce",
            RewardError::StaleNonce => "nonce advanced, please retry",
            RewardError::CalculatorUnauthorized => "claim signer not yet authorized",
            RewardError::PriceUnavailable | RewardError::Unavailable(_) => {
                "required data unavailable"
            }
            RewardError::NotFound(_) => "not found",
            _ => "internal error",
        }
    }
}

pub type RewardResult<T> = Result<T, RewardError>;
