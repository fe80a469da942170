// treasury/src/negotiation.rs

use crate::{
    participation::{LoanRecord, ParticipationRecord, RoundState},
    times::Times,
    TreasuryError, TreasuryResult,
};
use pool_core::{Amount, FeeModel, LoanRequest, PunishmentConfig, Timestamp};
use pool_crypto::Address;

/// Stateless validation of loan requests
pub struct LoanNegotiator<'a> {
    punishment: &'a PunishmentConfig,
    fees: &'a FeeModel,
}

impl<'a> LoanNegotiator<'a> {
    pub fn new(punishment: &'a PunishmentConfig, fees: &'a FeeModel) -> Self {
        Self { punishment, fees }
    }

    /// Largest fine a validator holding `stake` can receive
    pub fn max_punishment(&self, stake: &Amount) -> Amount {
        self.punishment.max_punishment(stake)
    }

    /// The request must target the next round while its window is open
    pub fn check_round(&self, times: &Times, round_since: Timestamp, now: Timestamp) -> TreasuryResult<()> {
        if round_since != times.next_round_since {
            return Err(TreasuryError::InvalidRound {
                round_since,
                reason: format!("next round starts at {}", times.next_round_since),
            });
        }
        if !times.accepts_requests(now) {
            return Err(TreasuryError::InvalidRound {
                round_since,
                reason: format!(
                    "requests accepted from {} until {}, now {}",
                    times.participate_since, times.participate_until, now
                ),
            });
        }
        Ok(())
    }

    /// Find the request this one replaces.
    ///
    /// A validator holds at most one loan per round. A repeated request
    /// replaces the earlier one while the round is open and fails after.
    pub fn check_duplicate(
        &self,
        record: Option<&ParticipationRecord>,
        validator: &Address,
    ) -> TreasuryResult<Option<LoanRecord>> {
        let record = match record {
            Some(r) => r,
            None => return Ok(None),
        };
        match (record.loan(validator), record.state) {
            (Some(existing), RoundState::Open) => Ok(Some(existing.clone())),
            (Some(_), _) => Err(TreasuryError::DuplicateLoan {
                validator: *validator,
                round_since: record.round_since,
            }),
            (None, RoundState::Open) => Ok(None),
            (None, _) => Err(TreasuryError::InvalidRound {
                round_since: record.round_since,
                reason: "stakes already forwarded".into(),
            }),
        }
    }

    /// Fee kept by the treasury out of the request's value
    pub fn request_fee(&self, request: &LoanRequest) -> Amount {
        self.fees.request_loan_fee(request.new_stake_msg.len())
    }

    /// Attached value must cover the punishment reserve, minimum payment and fee
    pub fn check_value(&self, request: &LoanRequest, value: &Amount) -> TreasuryResult<Amount> {
        let required = self.max_punishment(&request.loan_amount)
            + request.min_payment.clone()
            + self.request_fee(request);
        if value < &required {
            return Err(TreasuryError::InsufficientValue {
                required,
                provided: value.clone(),
            });
        }
        Ok(required)
    }

    /// Loan must fit in the coins the pool holds
    pub fn check_liquidity(&self, loan_amount: &Amount, available: &Amount) -> TreasuryResult<()> {
        if loan_amount > available {
            return Err(TreasuryError::InsufficientPoolLiquidity {
                required: loan_amount.clone(),
                available: available.clone(),
            });
        }
        Ok(())
    }
}
