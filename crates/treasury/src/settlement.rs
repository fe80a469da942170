// treasury/src/settlement.rs

use crate::participation::LoanRecord;
use pool_core::{Amount, RoundResult, REWARD_SHARE_BASE, VALIDATOR_SHARE_BASE};
use serde::{Deserialize, Serialize};
use std::cmp::{max, min};

/// How one loan's outcome is split between pool and validator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Value the consensus layer returns for this loan
    pub returned: Amount,
    /// Added to the pool's `total_coins`
    pub pool_gain: Amount,
    /// Sent back to the validator
    pub validator_payout: Amount,
    /// Pool gain beyond the principal
    pub profit: Amount,
    /// Principal not recovered
    pub loss: Amount,
}

/// Split the outcome of `loan`.
///
/// `reward_share` is the pool's governance share over `REWARD_SHARE_BASE`.
pub fn settle_loan(loan: &LoanRecord, result: &RoundResult, reward_share: u16) -> Settlement {
    let principal = loan.loan_amount.clone();
    let escrow = loan.escrow.clone();

    match result {
        RoundResult::NotElected => Settlement {
            returned: principal.clone(),
            pool_gain: principal,
            validator_payout: escrow,
            profit: Amount::zero(),
            loss: Amount::zero(),
        },

        RoundResult::Rewarded { reward } => {
            let validator_part = reward
                .mul_ratio(loan.validator_reward_share as u64, VALIDATOR_SHARE_BASE)
                .unwrap_or_else(Amount::zero);
            let by_validator_share = reward.saturating_sub(&validator_part);
            let by_governance = reward
                .mul_ratio(reward_share as u64, REWARD_SHARE_BASE)
                .unwrap_or_else(Amount::zero);
            let pool_cut = max(max(by_validator_share, by_governance), loan.min_payment.clone());

            // min_payment <= escrow, so the cut never exceeds reward + escrow
            let validator_payout = (escrow + reward.clone()).saturating_sub(&pool_cut);

            Settlement {
                returned: principal.clone() + reward.clone(),
                pool_gain: principal + pool_cut.clone(),
                validator_payout,
                profit: pool_cut,
                loss: Amount::zero(),
            }
        }

        RoundResult::Punished { punishment } => {
            let punishment = min(punishment.clone(), principal.clone());
            let covered = min(punishment.clone(), escrow.clone());
            let left = escrow.saturating_sub(&covered);
            let min_payment = min(loan.min_payment.clone(), left.clone());
            let loss = punishment.saturating_sub(&covered);

            Settlement {
                returned: principal.saturating_sub(&punishment),
                pool_gain: principal.saturating_sub(&loss) + min_payment.clone(),
                validator_payout: left.saturating_sub(&min_payment),
                profit: min_payment,
                loss,
            }
        }
    }
}
