// treasury/src/participation.rs

use crate::{settlement::Settlement, sub, TreasuryError, TreasuryResult};
use pool_core::{Amount, RoundResult, Timestamp};
use pool_crypto::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a round's participation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoundState {
    /// Accepting loan requests
    Open,
    /// Stakes forwarded, waiting for outcomes
    Closed,
    /// Some outcomes applied
    Resolved,
    /// Every loan settled
    Settled,
}

/// Lifecycle of a single loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanState {
    Pending,
    Staked,
    Settled,
}

/// A validator's loan within one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub validator: Address,
    pub loan_amount: Amount,
    pub min_payment: Amount,
    /// Reserved from the escrow, spent only if the validator is punished
    pub max_punishment: Amount,
    pub validator_reward_share: u8,
    /// Value held for the validator until the round resolves
    pub escrow: Amount,
    pub new_stake_msg: Vec<u8>,
    pub state: LoanState,
    pub outcome: Option<RoundResult>,
}

/// Loan requests and outcomes of one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub round_since: Timestamp,
    pub state: RoundState,
    pub loans: BTreeMap<Address, LoanRecord>,
    pub total_loan: Amount,
    pub total_punishment_reserve: Amount,
    pub total_min_payment: Amount,
    /// Pool gains beyond the returned principal
    pub profit: Amount,
    /// Principal lost to punishments not covered by escrow
    pub loss: Amount,
    /// Pool totals when the stakes were forwarded
    pub snapshot_coins: Amount,
    pub snapshot_tokens: Amount,
}

impl ParticipationRecord {
    pub fn new(round_since: Timestamp) -> Self {
        Self {
            round_since,
            state: RoundState::Open,
            loans: BTreeMap::new(),
            total_loan: Amount::zero(),
            total_punishment_reserve: Amount::zero(),
            total_min_payment: Amount::zero(),
            profit: Amount::zero(),
            loss: Amount::zero(),
            snapshot_coins: Amount::zero(),
            snapshot_tokens: Amount::zero(),
        }
    }

    pub fn loan(&self, validator: &Address) -> Option<&LoanRecord> {
        self.loans.get(validator)
    }

    /// Add a loan, replacing the validator's earlier request if any.
    /// Only valid while the round is open.
    pub fn insert_loan(&mut self, loan: LoanRecord) -> TreasuryResult<Option<LoanRecord>> {
        if self.state != RoundState::Open {
            return Err(TreasuryError::DuplicateLoan {
                validator: loan.validator,
                round_since: self.round_since,
            });
        }

        let replaced = self.loans.remove(&loan.validator);
        if let Some(old) = &replaced {
            self.total_loan = sub(&self.total_loan, &old.loan_amount, "total loan")?;
            self.total_punishment_reserve =
                sub(&self.total_punishment_reserve, &old.max_punishment, "punishment reserve")?;
            self.total_min_payment = sub(&self.total_min_payment, &old.min_payment, "min payment")?;
        }

        self.total_loan = self.total_loan.clone() + loan.loan_amount.clone();
        self.total_punishment_reserve = self.total_punishment_reserve.clone() + loan.max_punishment.clone();
        self.total_min_payment = self.total_min_payment.clone() + loan.min_payment.clone();
        self.loans.insert(loan.validator, loan);

        Ok(replaced)
    }

    /// Stop accepting requests and mark every loan as staked
    pub fn close(&mut self, total_coins: &Amount, total_tokens: &Amount) -> TreasuryResult<()> {
        if self.state != RoundState::Open {
            return Err(TreasuryError::InvalidRound {
                round_since: self.round_since,
                reason: "round is already closed".into(),
            });
        }
        self.state = RoundState::Closed;
        self.snapshot_coins = total_coins.clone();
        self.snapshot_tokens = total_tokens.clone();
        for loan in self.loans.values_mut() {
            loan.state = LoanState::Staked;
        }
        Ok(())
    }

    /// Staked loan of `validator`, if it still awaits an outcome
    pub fn staked_loan(&self, validator: &Address) -> Option<&LoanRecord> {
        self.loans.get(validator).filter(|l| l.state == LoanState::Staked)
    }

    /// Record a settlement for a staked loan
    pub fn settle(
        &mut self,
        validator: &Address,
        result: RoundResult,
        settlement: &Settlement,
    ) -> TreasuryResult<()> {
        let loan = self.loans.get_mut(validator)
            .filter(|l| l.state == LoanState::Staked)
            .ok_or_else(|| TreasuryError::InvalidRequest(format!("no staked loan for {}", validator)))?;

        loan.state = LoanState::Settled;
        loan.outcome = Some(result);
        self.profit = self.profit.clone() + settlement.profit.clone();
        self.loss = self.loss.clone() + settlement.loss.clone();
        self.state = if self.is_finished() { RoundState::Settled } else { RoundState::Resolved };
        Ok(())
    }

    /// Whether every loan has been settled
    pub fn is_finished(&self) -> bool {
        self.loans.values().all(|l| l.state == LoanState::Settled)
    }

    pub fn unsettled_count(&self) -> usize {
        self.loans.values().filter(|l| l.state != LoanState::Settled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan(label: &str, coins: u64) -> LoanRecord {
        LoanRecord {
            validator: Address::from_label(label),
            loan_amount: Amount::from_coins(coins),
            min_payment: Amount::from_coins(50),
            max_punishment: Amount::from_coins(101),
            validator_reward_share: 102,
            escrow: Amount::from_coins(151),
            new_stake_msg: vec![],
            state: LoanState::Pending,
            outcome: None,
        }
    }

    #[test]
    fn test_insert_and_replace() {
        let mut record = ParticipationRecord::new(1_024);
        assert!(record.insert_loan(loan("v1", 100)).unwrap().is_none());
        assert!(record.insert_loan(loan("v2", 200)).unwrap().is_none());
        assert_eq!(record.total_loan, Amount::from_coins(300));

        let replaced = record.insert_loan(loan("v1", 150)).unwrap().unwrap();
        assert_eq!(replaced.loan_amount, Amount::from_coins(100));
        assert_eq!(record.total_loan, Amount::from_coins(350));
        assert_eq!(record.total_min_payment, Amount::from_coins(100));
        assert_eq!(record.loans.len(), 2);
    }

    #[test]
    fn test_closed_round_rejects_requests() {
        let mut record = ParticipationRecord::new(1_024);
        record.insert_loan(loan("v1", 100)).unwrap();
        record.close(&Amount::from_coins(1_000), &Amount::from_coins(1_000)).unwrap();

        assert!(matches!(
            record.insert_loan(loan("v1", 100)),
            Err(TreasuryError::DuplicateLoan { .. })
        ));
        assert!(record.close(&Amount::zero(), &Amount::zero()).is_err());
        assert!(record.staked_loan(&Address::from_label("v1")).is_some());
    }

    #[test]
    fn test_state_progression() {
        let mut record = ParticipationRecord::new(1_024);
        record.insert_loan(loan("v1", 100)).unwrap();
        record.insert_loan(loan("v2", 100)).unwrap();
        record.close(&Amount::zero(), &Amount::zero()).unwrap();
        assert_eq!(record.state, RoundState::Closed);

        let none = Settlement::default();
        record.settle(&Address::from_label("v1"), RoundResult::NotElected, &none).unwrap();
        assert_eq!(record.state, RoundState::Resolved);
        assert_eq!(record.unsettled_count(), 1);

        // Settling twice is refused
        assert!(record.settle(&Address::from_label("v1"), RoundResult::NotElected, &none).is_err());

        record.settle(&Address::from_label("v2"), RoundResult::NotElected, &none).unwrap();
        assert_eq!(record.state, RoundState::Settled);
        assert!(record.is_finished());
    }
}
