// treasury/src/state.rs

use crate::{
    participation::ParticipationRecord,
    rewards::RewardHistory,
    sub, TreasuryResult,
};
use pool_core::{exchange_rate, Amount, Timestamp};
use pool_crypto::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default governance share of validator rewards (1/16)
pub const DEFAULT_REWARD_SHARE: u16 = 4_096;

/// Withdrawal waiting for liquidity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeRequest {
    pub owner: Address,
    pub tokens: Amount,
    /// Value left to pay for the payout messages
    pub fee_value: Amount,
}

/// Singleton state of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Coins held and not lent out
    pub total_coins: Amount,
    /// Pool token supply
    pub total_tokens: Amount,
    /// Coins deposited since the last published round
    pub total_staking: Amount,
    /// Tokens of queued withdrawals
    pub total_unstaking: Amount,
    /// Coins lent to validators
    pub total_validators_stake: Amount,
    pub participations: BTreeMap<Timestamp, ParticipationRecord>,
    pub rewards_history: RewardHistory,
    pub unstake_queue: VecDeque<UnstakeRequest>,
    pub stopped: bool,
    /// Governance share of rewards, over `REWARD_SHARE_BASE`
    pub reward_share: u16,
    pub driver: Address,
    pub halter: Address,
    pub governor: Address,
    pub proposed_governor: Option<Address>,
    /// Opaque metadata
    pub content: Vec<u8>,
}

impl PoolState {
    pub fn new(driver: Address, halter: Address, governor: Address) -> Self {
        Self {
            total_coins: Amount::zero(),
            total_tokens: Amount::zero(),
            total_staking: Amount::zero(),
            total_unstaking: Amount::zero(),
            total_validators_stake: Amount::zero(),
            participations: BTreeMap::new(),
            rewards_history: RewardHistory::new(),
            unstake_queue: VecDeque::new(),
            stopped: false,
            reward_share: DEFAULT_REWARD_SHARE,
            driver,
            halter,
            governor,
            proposed_governor: None,
            content: Vec::new(),
        }
    }

    /// Coins backing the token supply
    pub fn valuation(&self) -> Amount {
        self.total_coins.clone() + self.total_validators_stake.clone()
    }

    pub fn exchange_rate(&self) -> Decimal {
        exchange_rate(&self.valuation(), &self.total_tokens)
    }

    /// Tokens minted for a deposit of `coins` (1:1 for an empty pool).
    /// Priced against `valuation()`, so coins out on loan still back the tokens.
    pub fn tokens_for_coins(&self, coins: &Amount) -> Amount {
        let valuation = self.valuation();
        if self.total_tokens.is_zero() || valuation.is_zero() {
            return coins.clone();
        }
        coins.mul_div(&self.total_tokens, &valuation)
            .unwrap_or_else(|| coins.clone())
    }

    /// Coins released by burning `tokens`
    pub fn coins_for_tokens(&self, tokens: &Amount) -> TreasuryResult<Amount> {
        if tokens > &self.total_tokens {
            return Err(crate::TreasuryError::CalculationError(format!(
                "burning {} of {} tokens",
                tokens, self.total_tokens
            )));
        }
        Ok(tokens.mul_div(&self.valuation(), &self.total_tokens)
            .unwrap_or_else(Amount::zero))
    }

    /// Move `amount` from the pool to a validator stake
    pub fn lend(&mut self, amount: &Amount) -> TreasuryResult<()> {
        self.total_coins = sub(&self.total_coins, amount, "total coins")?;
        self.total_validators_stake = self.total_validators_stake.clone() + amount.clone();
        Ok(())
    }

    /// Close out a stake of `principal`, crediting `pool_gain` back
    pub fn repay(&mut self, principal: &Amount, pool_gain: &Amount) -> TreasuryResult<()> {
        self.total_validators_stake = sub(&self.total_validators_stake, principal, "validators stake")?;
        self.total_coins = self.total_coins.clone() + pool_gain.clone();
        Ok(())
    }

    pub fn mint(&mut self, coins: &Amount, tokens: &Amount) {
        self.total_coins = self.total_coins.clone() + coins.clone();
        self.total_tokens = self.total_tokens.clone() + tokens.clone();
        self.total_staking = self.total_staking.clone() + coins.clone();
    }

    /// Exact reversal of `mint`
    pub fn unmint(&mut self, coins: &Amount, tokens: &Amount) -> TreasuryResult<()> {
        self.total_coins = sub(&self.total_coins, coins, "total coins")?;
        self.total_tokens = sub(&self.total_tokens, tokens, "total tokens")?;
        self.total_staking = self.total_staking.saturating_sub(coins);
        Ok(())
    }

    pub fn burn(&mut self, coins: &Amount, tokens: &Amount) -> TreasuryResult<()> {
        self.total_coins = sub(&self.total_coins, coins, "total coins")?;
        self.total_tokens = sub(&self.total_tokens, tokens, "total tokens")?;
        Ok(())
    }

    pub fn view(&self) -> TreasuryStateView {
        TreasuryStateView {
            total_coins: self.total_coins.clone(),
            total_tokens: self.total_tokens.clone(),
            total_staking: self.total_staking.clone(),
            total_unstaking: self.total_unstaking.clone(),
            total_validators_stake: self.total_validators_stake.clone(),
            exchange_rate: self.exchange_rate(),
            participations: self.participations.keys().copied().collect(),
            pending_withdrawals: self.unstake_queue.len(),
            stopped: self.stopped,
            reward_share: self.reward_share,
            driver: self.driver,
            halter: self.halter,
            governor: self.governor,
            proposed_governor: self.proposed_governor,
            content: self.content.clone(),
        }
    }
}

/// Read-only summary returned by the state query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasuryStateView {
    pub total_coins: Amount,
    pub total_tokens: Amount,
    pub total_staking: Amount,
    pub total_unstaking: Amount,
    pub total_validators_stake: Amount,
    pub exchange_rate: Decimal,
    /// Rounds with an active participation record
    pub participations: Vec<Timestamp>,
    pub pending_withdrawals: usize,
    pub stopped: bool,
    pub reward_share: u16,
    pub driver: Address,
    pub halter: Address,
    pub governor: Address,
    pub proposed_governor: Option<Address>,
    pub content: Vec<u8>,
}
