//! Claim authorizer: validates a claim request, computes the delta over
//! what the user has already claimed on-chain, and has the signer produce
//! an authorization the treasury contract's `claim` entry point accepts.
//!
//! Key material never enters this module; [`Signer`] exposes only
//! `sign(digest) -> signature`.

use crate::contracts::ChainReader;
use crate::storage::PositionStore;
use async_trait::async_trait;
use chrono::Utc;
use reward_types::{
    ClaimAuthorization, EcdsaSignature, EthAddress, RewardError, RewardResult, TokenAmount,
    REWARD_TOKEN_DECIMALS,
};
use reward_crypto::claim_authorization_digest;
use std::sync::Arc;
use uuid::Uuid;

/// Abstracts the key material backing claim authorizations. Production
/// deployments back this with an HSM or a key management service; the only
/// thing this module ever sees is the digest in and the signature out.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, digest: [u8; 32]) -> RewardResult<EcdsaSignature>;
    fn address(&self) -> EthAddress;
}

pub struct ClaimAuthorizer {
    store: PositionStore,
    chain: Arc<ChainReader>,
    signer: Arc<dyn Signer>,
    reward_contract: EthAddress,
    chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct ClaimGrant {
    pub user_address: EthAddress,
    pub nonce: u64,
    pub cumulative_authorized_units: TokenAmount,
    pub delta_units: TokenAmount,
    pub signature: EcdsaSignature,
}

impl ClaimAuthorizer {
    pub fn new(
        store: PositionStore,
        chain: Arc<ChainReader>,
        signer: Arc<dyn Signer>,
        reward_contract: EthAddress,
        chain_id: u64,
    ) -> Self {
        Self { store, chain, signer, reward_contract, chain_id }
    }

    /// Authorizes a claim for `user`, covering every accrual not yet
    /// reflected in a prior authorization or already claimed on-chain, up to
    /// the program's per-claim cap. Returns [`RewardError::NothingToClaim`]
    /// if the computed grant is zero.
    pub async fn authorize_claim(&self, user_address: EthAddress) -> RewardResult<ClaimGrant> {
        if !self.chain.is_authorized_signer(&self.signer.address()).await? {
            return Err(RewardError::CalculatorUnauthorized);
        }

        let owner = self.store.get_or_create_user(&user_address)?;
        let mut total_accrued: u128 = 0;
        for position in self.store.get_positions_by_owner(owner.id)? {
            let accrued = self.store.cumulative_accrued(position.id, REWARD_TOKEN_DECIMALS)?;
            total_accrued = total_accrued
                .checked_add(accrued.raw)
                .ok_or_else(|| RewardError::Amount("cumulative accrual overflow".into()))?;
        }

        let already_authorized = self.store.sum_cumulative_authorized(&user_address)?;
        let already_claimed_on_chain = self.chain.user_claimed_amount(&user_address).await?;
        let a_prev = already_authorized.max(already_claimed_on_chain);

        let max_claim = self
            .store
            .get_program_settings()?
            .ok_or_else(|| RewardError::Config("program settings not initialized".into()))?
            .absolute_max_claim_units
            .raw;
        let grant = compute_grant(total_accrued, a_prev, max_claim).ok_or(RewardError::NothingToClaim)?;
        let new_cumulative = a_prev + grant;

        // The on-chain nonce is authoritative: if a prior authorization was
        // consumed without this store observing it, the locally-derived
        // nonce would lag and a signature built from it would be rejected
        // (or, worse, misidentified as a replay) by the contract.
        let on_chain_nonce = self.chain.user_nonce(&user_address).await?;
        let next_nonce = self.store.next_claim_nonce(&user_address)?;
        let nonce = resolve_claim_nonce(on_chain_nonce, next_nonce);

        let digest = claim_authorization_digest(
            self.chain_id,
            &self.reward_contract,
            &user_address,
            new_cumulative,
            nonce,
        );
        let signature = self.signer.sign(digest).await?;

        let cumulative_authorized_units = TokenAmount::from_raw(new_cumulative, REWARD_TOKEN_DECIMALS);
        self.store.record_claim_authorization(&ClaimAuthorization {
            id: Uuid::new_v4(),
            user_address,
            nonce,
            cumulative_authorized_units,
            signed_at: Utc::now(),
            signature_digest: digest,
        })?;

        Ok(ClaimGrant {
            user_address,
            nonce,
            cumulative_authorized_units,
            delta_units: TokenAmount::from_raw(grant, REWARD_TOKEN_DECIMALS),
            signature,
        })
    }
}

/// A [`Signer`] backed by an in-process secp256k1 key. The key is zeroized
/// on drop by [`reward_types::Secp256k1PrivateKey`]; nothing outside this
/// struct ever sees the bytes.
pub struct LocalSigner {
    private_key: reward_types::Secp256k1PrivateKey,
    address: EthAddress,
}

impl LocalSigner {
    pub fn new(private_key: reward_types::Secp256k1PrivateKey) -> RewardResult<Self> {
        let address = reward_crypto::derive_eth_address_from_private(&private_key)?;
        Ok(Self { private_key, address })
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn sign(&self, digest: [u8; 32]) -> RewardResult<EcdsaSignature> {
        reward_crypto::sign_message(&self.private_key, &digest)
    }

    fn address(&self) -> EthAddress {
        self.address
    }
}

/// The grant arithmetic, pulled out of [`ClaimAuthorizer::authorize_claim`]
/// so it can be exercised without a chain connection: `delta` is whatever
/// accrued beyond `a_prev` (the greater of what's already authorized and
/// what's already been claimed on-chain), capped at `max_claim`. Returns
/// `None` when there is nothing to grant.
fn compute_grant(total_accrued: u128, a_prev: u128, max_claim: u128) -> Option<u128> {
    if total_accrued <= a_prev {
        return None;
    }
    let delta = total_accrued - a_prev;
    let grant = delta.min(max_claim);
    if grant == 0 {
        None
    } else {
        Some(grant)
    }
}

/// The chain's nonce is authoritative. When the store's locally-derived
/// next nonce already agrees with it, use that value; otherwise defer to
/// the chain.
fn resolve_claim_nonce(on_chain_nonce: u64, next_nonce: u64) -> u64 {
    if on_chain_nonce == next_nonce {
        next_nonce
    } else {
        on_chain_nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_accrual_and_prior_grant_yields_nothing_to_claim() {
        assert_eq!(compute_grant(1_000, 1_000, 10_000), None);
    }

    #[test]
    fn accrual_below_prior_grant_yields_nothing_to_claim() {
        assert_eq!(compute_grant(500, 1_000, 10_000), None);
    }

    #[test]
    fn delta_under_cap_grants_the_full_delta() {
        assert_eq!(compute_grant(1_500, 1_000, 10_000), Some(500));
    }

    #[test]
    fn delta_over_cap_is_capped_at_max_claim() {
        assert_eq!(compute_grant(50_000, 1_000, 10_000), Some(10_000));
    }

    #[test]
    fn zero_cap_yields_nothing_to_claim_even_with_positive_delta() {
        assert_eq!(compute_grant(1_500, 1_000, 0), None);
    }

    #[test]
    fn nonce_resolution_uses_local_value_when_chain_agrees() {
        assert_eq!(resolve_claim_nonce(7, 7), 7);
    }

    #[test]
    fn nonce_resolution_defers_to_chain_when_chain_is_ahead() {
        assert_eq!(resolve_claim_nonce(9, 7), 9);
    }

    #[test]
    fn nonce_resolution_defers_to_chain_when_local_is_ahead() {
        assert_eq!(resolve_claim_nonce(3, 7), 3);
    }
}
