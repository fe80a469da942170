// sandbox/src/consensus.rs

use pool_core::{
    Actor, ActorError, ActorKind, ActorResult, Amount, Context, CoreResult, LoanOutcome, Message,
    Op, RoundResult, Timestamp,
};
use pool_crypto::Address;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;

const EXIT_STAKE_REFUSED: u32 = 201;
const EXIT_NOT_AUTHORITY: u32 = 202;

/// Stake locked for one validator in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldStake {
    pub treasury: Address,
    pub amount: Amount,
}

/// Stand-in for the chain's elector: takes stakes during elections and
/// returns them when the authority reports how the round went
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusStub {
    authority: Address,
    stakes: BTreeMap<(Timestamp, Address), HeldStake>,
}

impl ConsensusStub {
    pub fn new(authority: Address) -> Self {
        Self { authority, stakes: BTreeMap::new() }
    }

    pub fn authority(&self) -> &Address {
        &self.authority
    }

    pub fn held(&self, round_since: Timestamp, validator: &Address) -> Option<&HeldStake> {
        self.stakes.get(&(round_since, *validator))
    }

    pub fn total_held(&self) -> Amount {
        self.stakes.values().map(|s| &s.amount).sum()
    }

    /// Value the authority attaches to a report: all rewards plus one coin for fees
    pub fn report_value(outcomes: &[LoanOutcome]) -> Amount {
        let rewards: Amount = outcomes
            .iter()
            .filter_map(|o| match &o.result {
                RoundResult::Rewarded { reward } => Some(reward),
                _ => None,
            })
            .sum();
        rewards + Amount::from_coins(1)
    }

    fn new_stake(
        &mut self,
        ctx: &mut Context<'_>,
        msg: &Message,
        validator: &Address,
        round_since: Timestamp,
        stake: &Amount,
    ) -> ActorResult {
        let until = ctx.config.validators.until;
        let opens = until.saturating_sub(ctx.config.elections.start_before);
        if round_since != until || ctx.now < opens || ctx.now >= until {
            return Err(ActorError::new(
                EXIT_STAKE_REFUSED,
                format!("elections for {} are not open at {}", round_since, ctx.now),
            ));
        }
        if &msg.value < stake {
            return Err(ActorError::new(
                EXIT_STAKE_REFUSED,
                format!("stake {} carries only {}", stake, msg.value),
            ));
        }
        let key = (round_since, *validator);
        if self.stakes.contains_key(&key) {
            return Err(ActorError::new(
                EXIT_STAKE_REFUSED,
                format!("{} already staked for {}", validator, round_since),
            ));
        }

        self.stakes.insert(key, HeldStake { treasury: msg.from, amount: stake.clone() });
        tracing::debug!("Elector holds {} for {} in round {}", stake, validator, round_since);
        Ok(())
    }

    fn report_outcomes(
        &mut self,
        ctx: &mut Context<'_>,
        msg: &Message,
        treasury: &Address,
        round_since: Timestamp,
        outcomes: &[LoanOutcome],
    ) -> ActorResult {
        if msg.from != self.authority {
            return Err(ActorError::new(EXIT_NOT_AUTHORITY, format!("{} is not the authority", msg.from)));
        }

        let mut principal = Amount::zero();
        for outcome in outcomes {
            let key = (round_since, outcome.validator);
            let held = match self.stakes.get(&key) {
                Some(held) if &held.treasury == treasury => held.clone(),
                _ => continue,
            };
            self.stakes.remove(&key);
            let returned = match &outcome.result {
                RoundResult::Punished { punishment } => {
                    held.amount.saturating_sub(std::cmp::min(punishment, &held.amount))
                }
                _ => held.amount,
            };
            principal = principal + returned;
        }

        let value = principal + ctx.remaining_value();
        ctx.send(*treasury, value, Op::SettleRound { round_since, outcomes: outcomes.to_vec() });
        tracing::debug!("Elector reported {} outcomes of round {}", outcomes.len(), round_since);
        Ok(())
    }
}

impl Actor for ConsensusStub {
    fn kind(&self) -> ActorKind {
        ActorKind::Consensus
    }

    fn receive(&mut self, ctx: &mut Context<'_>, msg: &Message) -> ActorResult {
        match &msg.op {
            Op::TopUp | Op::GasExcess => Ok(()),
            Op::NewStake { validator, round_since, stake, .. } => {
                self.new_stake(ctx, msg, validator, *round_since, stake)
            }
            Op::ReportOutcomes { treasury, round_since, outcomes } => {
                self.report_outcomes(ctx, msg, treasury, *round_since, outcomes)
            }
            other => Err(ActorError::new(0xffff, format!("unexpected {}", other.name()))),
        }
    }

    fn receive_bounce(&mut self, _ctx: &mut Context<'_>, msg: &Message) -> ActorResult {
        // A refused settlement leaves its value here
        if let Op::SettleRound { round_since, .. } = &msg.op {
            tracing::warn!("Settlement of round {} refused by {}", round_since, msg.from);
        }
        Ok(())
    }

    fn clone_actor(&self) -> Box<dyn Actor> {
        Box::new(self.clone())
    }

    fn save_state(&self) -> CoreResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
