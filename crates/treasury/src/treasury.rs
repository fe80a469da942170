// treasury/src/treasury.rs

use crate::{
    negotiation::LoanNegotiator,
    participation::{LoanRecord, LoanState, ParticipationRecord, RoundState},
    rewards::RewardRecord,
    settlement::{settle_loan, Settlement},
    state::{PoolState, TreasuryStateView, UnstakeRequest},
    sub,
    times::Times,
    wallet::{wallet_address, Wallet},
    TreasuryError, TreasuryResult,
};
use pool_core::{
    Actor, ActorKind, ActorResult, Amount, ChainConfig, Context, CoreResult, FeeModel, Fees,
    LoanOutcome, LoanRequest, Message, Op, RoundResult, Timestamp,
};
use pool_crypto::{Address, HashAlgorithm, Hashable};
use std::any::Any;

/// The pool's accounting actor
#[derive(Debug, Clone)]
pub struct Treasury {
    state: PoolState,
}

impl Treasury {
    pub fn new(driver: Address, halter: Address, governor: Address) -> Self {
        Self { state: PoolState::new(driver, halter, governor) }
    }

    pub fn from_state(state: PoolState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    // Queries

    pub fn get_fees(&self, fees: &FeeModel) -> Fees {
        fees.fees()
    }

    pub fn get_treasury_state(&self) -> TreasuryStateView {
        self.state.view()
    }

    pub fn get_times(&self, config: &ChainConfig) -> Times {
        Times::from_config(config)
    }

    pub fn get_wallet_address(&self, treasury: &Address, owner: &Address) -> Address {
        wallet_address(treasury, owner)
    }

    pub fn get_participation(&self, round_since: Timestamp) -> Option<&ParticipationRecord> {
        self.state.participations.get(&round_since)
    }

    pub fn get_reward(&self, round_since: Timestamp) -> Option<&RewardRecord> {
        self.state.rewards_history.get(round_since)
    }

    pub fn get_max_punishment(&self, config: &ChainConfig, stake: &Amount) -> Amount {
        config.punishment.max_punishment(stake)
    }

    // Deposits

    fn deposit_coins(&mut self, ctx: &mut Context<'_>, msg: &Message) -> TreasuryResult<()> {
        if self.state.stopped {
            return Err(TreasuryError::Paused);
        }
        let fee = ctx.fees.deposit_coins_fee();
        if msg.value <= fee {
            return Err(TreasuryError::InsufficientValue {
                required: fee,
                provided: msg.value.clone(),
            });
        }

        let coins = sub(&msg.value, &fee, "deposit")?;
        let tokens = self.state.tokens_for_coins(&coins);
        self.state.mint(&coins, &tokens);

        let owner = msg.from;
        let unlock_at = Times::from_config(ctx.config).next_round_since;
        let forward = sub(&ctx.remaining_value(), &coins, "deposit forward")?;
        ctx.send_with_init(
            wallet_address(&ctx.address, &owner),
            forward,
            Op::SaveCoins { owner, coins: coins.clone(), tokens: tokens.clone(), unlock_at },
            Box::new(Wallet::new(ctx.address, owner)),
        );

        tracing::info!("Deposit of {} from {}: minted {} tokens", coins, owner, tokens);
        self.release_stale_rounds(ctx)?;
        self.process_unstake_queue(ctx)?;
        Ok(())
    }

    /// The wallet refused the tokens: undo the mint and refund
    fn save_coins_bounced(
        &mut self,
        ctx: &mut Context<'_>,
        owner: &Address,
        coins: &Amount,
        tokens: &Amount,
    ) -> TreasuryResult<()> {
        self.state.unmint(coins, tokens)?;
        let refund = coins.clone() + ctx.remaining_value();
        ctx.send_non_bounceable(*owner, refund, Op::GasExcess);
        tracing::warn!("Deposit of {} for {} reverted", coins, owner);
        Ok(())
    }

    // Loans

    fn request_loan(&mut self, ctx: &mut Context<'_>, msg: &Message, request: &LoanRequest) -> TreasuryResult<()> {
        if self.state.stopped {
            return Err(TreasuryError::Paused);
        }

        self.release_stale_rounds(ctx)?;

        let fees = ctx.fees.clone();
        let negotiator = LoanNegotiator::new(&ctx.config.punishment, &fees);
        let times = Times::from_config(ctx.config);
        let validator = msg.from;

        negotiator.check_round(&times, request.round_since, ctx.now)?;
        if request.loan_amount.is_zero() {
            return Err(TreasuryError::InvalidRequest("zero loan".into()));
        }
        let replaced = negotiator.check_duplicate(
            self.state.participations.get(&request.round_since),
            &validator,
        )?;
        negotiator.check_value(request, &msg.value)?;

        let released = replaced.as_ref().map(|l| l.loan_amount.clone()).unwrap_or_else(Amount::zero);
        let available = self.state.total_coins.clone() + released;
        negotiator.check_liquidity(&request.loan_amount, &available)?;

        let escrow = sub(&msg.value, &negotiator.request_fee(request), "escrow")?;
        let loan = LoanRecord {
            validator,
            loan_amount: request.loan_amount.clone(),
            min_payment: request.min_payment.clone(),
            max_punishment: negotiator.max_punishment(&request.loan_amount),
            validator_reward_share: request.validator_reward_share,
            escrow,
            new_stake_msg: request.new_stake_msg.clone(),
            state: LoanState::Pending,
            outcome: None,
        };

        let record = self.state.participations
            .entry(request.round_since)
            .or_insert_with(|| ParticipationRecord::new(request.round_since));
        let replaced = record.insert_loan(loan)?;

        if let Some(old) = replaced {
            self.state.repay(&old.loan_amount, &old.loan_amount)?;
            ctx.send_non_bounceable(
                validator,
                old.escrow,
                Op::LoanReleased { round_since: request.round_since },
            );
            tracing::info!("Loan request of {} for round {} replaced", validator, request.round_since);
        }
        self.state.lend(&request.loan_amount)?;

        tracing::info!(
            "Loan of {} for {} in round {} accepted",
            request.loan_amount,
            validator,
            request.round_since
        );
        self.process_unstake_queue(ctx)?;
        Ok(())
    }

    /// Close the round's requests and forward the stakes
    fn participate_in_election(
        &mut self,
        ctx: &mut Context<'_>,
        msg: &Message,
        round_since: Timestamp,
    ) -> TreasuryResult<()> {
        // Stakes and their fees come out of the treasury's balance
        let excess = ctx.remaining_value();
        if self.release_stale_rounds(ctx)?.contains(&round_since) {
            ctx.send_excess(msg.from, excess);
            return Ok(());
        }

        let times = Times::from_config(ctx.config);
        if round_since != times.next_round_since || !times.accepts_participation(ctx.now) {
            return Err(TreasuryError::InvalidRound {
                round_since,
                reason: format!(
                    "participation for round {} runs from {} until {}",
                    times.next_round_since, times.participate_until, times.next_round_since
                ),
            });
        }

        let total_coins = self.state.total_coins.clone();
        let total_tokens = self.state.total_tokens.clone();
        let record = self.state.participations.get_mut(&round_since)
            .ok_or_else(|| TreasuryError::InvalidRound {
                round_since,
                reason: "no loan requests".into(),
            })?;
        record.close(&total_coins, &total_tokens)?;

        let per_loan = ctx.fees.gas().participate_per_loan;
        ctx.charge_gas(per_loan * record.loans.len() as u64)
            .map_err(|e| TreasuryError::CalculationError(e.reason))?;

        let new_stake_fee = ctx.fees.new_stake_fee();
        let elector = ctx.config.elector;
        for loan in record.loans.values() {
            let op = Op::NewStake {
                validator: loan.validator,
                round_since,
                stake: loan.loan_amount.clone(),
                payload: loan.new_stake_msg.clone(),
            };
            tracing::debug!(
                "Stake of {} for {} (payload {})",
                loan.loan_amount,
                loan.validator,
                loan.new_stake_msg.hash_with(HashAlgorithm::Blake3).short()
            );
            let value = loan.loan_amount.clone() + new_stake_fee.clone() + ctx.forward_fee(&op);
            ctx.send(elector, value, op);
        }

        tracing::info!(
            "Round {}: forwarded {} stakes totalling {}",
            round_since,
            record.loans.len(),
            record.total_loan
        );

        ctx.send_excess(msg.from, excess);
        Ok(())
    }

    /// The consensus layer refused a stake: release the loan
    fn new_stake_bounced(
        &mut self,
        ctx: &mut Context<'_>,
        validator: &Address,
        round_since: Timestamp,
    ) -> TreasuryResult<()> {
        let record = match self.state.participations.get_mut(&round_since) {
            Some(r) => r,
            None => return Ok(()),
        };
        let loan = match record.staked_loan(validator) {
            Some(l) => l.clone(),
            None => return Ok(()),
        };

        let settlement = settle_loan(&loan, &RoundResult::NotElected, self.state.reward_share);
        record.settle(validator, RoundResult::NotElected, &settlement)?;
        self.state.repay(&loan.loan_amount, &settlement.pool_gain)?;
        ctx.send_non_bounceable(*validator, settlement.validator_payout, Op::LoanReleased { round_since });

        tracing::warn!("Stake of {} for round {} refused, loan released", validator, round_since);
        self.finish_round(ctx, round_since);
        self.process_unstake_queue(ctx)?;
        Ok(())
    }

    /// Apply reported outcomes and repay the pool
    fn settle_round(
        &mut self,
        ctx: &mut Context<'_>,
        msg: &Message,
        round_since: Timestamp,
        outcomes: &[LoanOutcome],
    ) -> TreasuryResult<()> {
        if msg.from != ctx.config.elector {
            return Err(TreasuryError::unauthorized(msg.from, "elector"));
        }

        // Plan first so that a short value changes nothing
        let mut plan: Vec<(LoanRecord, RoundResult, Settlement)> = Vec::new();
        if let Some(record) = self.state.participations.get(&round_since) {
            for outcome in outcomes {
                let duplicate = plan.iter().any(|(l, _, _)| l.validator == outcome.validator);
                if duplicate {
                    continue;
                }
                if let Some(loan) = record.staked_loan(&outcome.validator) {
                    let settlement = settle_loan(loan, &outcome.result, self.state.reward_share);
                    plan.push((loan.clone(), outcome.result.clone(), settlement));
                }
            }
        }

        let returned: Amount = plan.iter().map(|(_, _, s)| &s.returned).sum();
        let budget = msg.value.saturating_sub(ctx.compute_fee());
        if budget < returned {
            return Err(TreasuryError::InsufficientValue {
                required: returned + ctx.compute_fee().clone(),
                provided: msg.value.clone(),
            });
        }

        for (loan, result, settlement) in &plan {
            if let Some(record) = self.state.participations.get_mut(&round_since) {
                record.settle(&loan.validator, result.clone(), settlement)?;
            }
            self.state.repay(&loan.loan_amount, &settlement.pool_gain)?;

            if !settlement.validator_payout.is_zero() {
                let op = Op::LoanSettled { round_since, result: result.clone() };
                let value = settlement.validator_payout.clone() + ctx.forward_fee(&op);
                ctx.send_non_bounceable(loan.validator, value, op);
            }
            tracing::info!(
                "Round {}: loan of {} settled as {:?}, pool gains {}",
                round_since,
                loan.validator,
                result,
                settlement.pool_gain
            );
        }

        // Value carried for unknown or already settled entries goes back
        let excess = sub(&budget, &returned, "settlement excess")?;
        ctx.send_excess(msg.from, excess);

        self.finish_round(ctx, round_since);
        self.release_stale_rounds(ctx)?;
        self.process_unstake_queue(ctx)?;
        Ok(())
    }

    /// Release open rounds whose election has passed without participation.
    /// Principal returns to the pool and escrows to their validators.
    fn release_stale_rounds(&mut self, ctx: &mut Context<'_>) -> TreasuryResult<Vec<Timestamp>> {
        let next_round = Times::from_config(ctx.config).next_round_since;
        let stale: Vec<Timestamp> = self.state.participations
            .iter()
            .filter(|(since, record)| **since < next_round && record.state == RoundState::Open)
            .map(|(since, _)| *since)
            .collect();

        for round_since in &stale {
            let record = match self.state.participations.remove(round_since) {
                Some(r) => r,
                None => continue,
            };
            let count = record.loans.len();
            for loan in record.loans.into_values() {
                self.state.repay(&loan.loan_amount, &loan.loan_amount)?;
                ctx.send_non_bounceable(
                    loan.validator,
                    loan.escrow,
                    Op::LoanReleased { round_since: *round_since },
                );
            }
            tracing::warn!("Round {} missed its election, {} loans released", round_since, count);
        }

        if !stale.is_empty() {
            self.process_unstake_queue(ctx)?;
        }
        Ok(stale)
    }

    /// Publish and drop a fully settled round
    fn finish_round(&mut self, ctx: &Context<'_>, round_since: Timestamp) {
        let finished = self.state.participations.get(&round_since)
            .map(|r| r.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        if let Some(record) = self.state.participations.remove(&round_since) {
            let reward = RewardRecord::from_participation(&record, ctx.now);
            tracing::info!(
                "Round {} published: profit {}, loss {}",
                round_since,
                reward.profit,
                reward.loss
            );
            self.state.rewards_history.publish(reward);
            self.state.total_staking = Amount::zero();
        }
    }

    // Withdrawals

    fn burn_tokens(
        &mut self,
        ctx: &mut Context<'_>,
        msg: &Message,
        owner: &Address,
        tokens: &Amount,
    ) -> TreasuryResult<()> {
        if self.state.stopped {
            return Err(TreasuryError::Paused);
        }
        if msg.from != wallet_address(&ctx.address, owner) {
            return Err(TreasuryError::unauthorized(msg.from, "wallet"));
        }
        if tokens.is_zero() {
            return Err(TreasuryError::InvalidRequest("zero tokens".into()));
        }

        let fee_value = ctx.remaining_value();
        let required = ctx.fees.withdraw_confirm_value()
            + ctx.forward_fee(&Op::Withdrawal { tokens: tokens.clone() });
        if fee_value < required {
            return Err(TreasuryError::InsufficientValue { required, provided: fee_value });
        }

        let request = UnstakeRequest { owner: *owner, tokens: tokens.clone(), fee_value };
        let coins = self.state.coins_for_tokens(tokens)?;
        if self.state.unstake_queue.is_empty() && coins <= self.state.total_coins {
            self.pay_withdrawal(ctx, &request)?;
        } else {
            self.state.total_unstaking = self.state.total_unstaking.clone() + tokens.clone();
            tracing::info!("Withdrawal of {} tokens for {} queued", tokens, owner);
            self.state.unstake_queue.push_back(request);
        }
        Ok(())
    }

    fn pay_withdrawal(&mut self, ctx: &mut Context<'_>, request: &UnstakeRequest) -> TreasuryResult<()> {
        let coins = self.state.coins_for_tokens(&request.tokens)?;
        self.state.burn(&coins, &request.tokens)?;

        let confirm = ctx.fees.withdraw_confirm_value();
        let rest = sub(&request.fee_value, &confirm, "withdraw fee")?;
        ctx.send_non_bounceable(
            request.owner,
            coins.clone() + rest,
            Op::Withdrawal { tokens: request.tokens.clone() },
        );
        ctx.send_non_bounceable(
            wallet_address(&ctx.address, &request.owner),
            confirm,
            Op::WithdrawConfirmed { tokens: request.tokens.clone() },
        );

        tracing::info!("Paid {} for {} tokens to {}", coins, request.tokens, request.owner);
        Ok(())
    }

    /// Pay queued withdrawals in order while liquidity allows
    fn process_unstake_queue(&mut self, ctx: &mut Context<'_>) -> TreasuryResult<()> {
        while let Some(front) = self.state.unstake_queue.front() {
            let coins = self.state.coins_for_tokens(&front.tokens)?;
            if coins > self.state.total_coins {
                break;
            }
            let request = match self.state.unstake_queue.pop_front() {
                Some(r) => r,
                None => break,
            };
            self.state.total_unstaking = sub(&self.state.total_unstaking, &request.tokens, "total unstaking")?;
            self.pay_withdrawal(ctx, &request)?;
        }
        Ok(())
    }

    // Governance

    fn require(sender: &Address, role: &Address, name: &'static str) -> TreasuryResult<()> {
        if sender != role {
            return Err(TreasuryError::unauthorized(*sender, name));
        }
        Ok(())
    }

    fn govern(&mut self, ctx: &mut Context<'_>, msg: &Message) -> TreasuryResult<()> {
        let sender = msg.from;
        let s = &mut self.state;
        match &msg.op {
            Op::ProposeGovernor { new_governor } => {
                Self::require(&sender, &s.governor, "governor")?;
                s.proposed_governor = Some(*new_governor);
            }
            Op::AcceptGovernance => {
                match s.proposed_governor {
                    Some(proposed) if proposed == sender => {
                        s.governor = proposed;
                        s.proposed_governor = None;
                    }
                    _ => return Err(TreasuryError::unauthorized(sender, "proposed governor")),
                }
            }
            Op::SetHalter { new_halter } => {
                Self::require(&sender, &s.governor, "governor")?;
                s.halter = *new_halter;
            }
            Op::SetDriver { new_driver } => {
                Self::require(&sender, &s.halter, "halter")?;
                s.driver = *new_driver;
            }
            Op::SetContent { content } => {
                Self::require(&sender, &s.governor, "governor")?;
                s.content = content.clone();
            }
            Op::SetStopped { stopped } => {
                Self::require(&sender, &s.halter, "halter")?;
                s.stopped = *stopped;
            }
            Op::SetRewardShare { reward_share } => {
                Self::require(&sender, &s.governor, "governor")?;
                s.reward_share = *reward_share;
            }
            other => return Err(TreasuryError::UnknownOp(other.opcode())),
        }

        tracing::info!("Governance: {} by {}", msg.op.name(), sender);
        let excess = ctx.remaining_value();
        ctx.send_excess(sender, excess);
        Ok(())
    }
}

impl Actor for Treasury {
    fn kind(&self) -> ActorKind {
        ActorKind::Treasury
    }

    fn receive(&mut self, ctx: &mut Context<'_>, msg: &Message) -> ActorResult {
        match &msg.op {
            Op::TopUp => Ok(()),
            Op::DepositCoins => Ok(self.deposit_coins(ctx, msg)?),
            Op::RequestLoan(request) => Ok(self.request_loan(ctx, msg, request)?),
            Op::ParticipateInElection { round_since } => {
                Ok(self.participate_in_election(ctx, msg, *round_since)?)
            }
            Op::SettleRound { round_since, outcomes } => {
                Ok(self.settle_round(ctx, msg, *round_since, outcomes)?)
            }
            Op::BurnTokens { owner, tokens } => Ok(self.burn_tokens(ctx, msg, owner, tokens)?),
            Op::ProposeGovernor { .. }
            | Op::AcceptGovernance
            | Op::SetHalter { .. }
            | Op::SetDriver { .. }
            | Op::SetContent { .. }
            | Op::SetStopped { .. }
            | Op::SetRewardShare { .. } => Ok(self.govern(ctx, msg)?),
            other => Err(TreasuryError::UnknownOp(other.opcode()).into()),
        }
    }

    fn receive_bounce(&mut self, ctx: &mut Context<'_>, msg: &Message) -> ActorResult {
        match &msg.op {
            Op::SaveCoins { owner, coins, tokens, .. } => {
                Ok(self.save_coins_bounced(ctx, owner, coins, tokens)?)
            }
            Op::NewStake { validator, round_since, .. } => {
                Ok(self.new_stake_bounced(ctx, validator, *round_since)?)
            }
            _ => Ok(()),
        }
    }

    fn clone_actor(&self) -> Box<dyn Actor> {
        Box::new(self.clone())
    }

    fn save_state(&self) -> CoreResult<Vec<u8>> {
        Ok(bincode::serialize(&self.state)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::{OutMessage, ValidatorSetTiming};

    struct Fixture {
        config: ChainConfig,
        address: Address,
        treasury: Treasury,
        now: Timestamp,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: ChainConfig::test(),
                address: Address::from_label("treasury"),
                treasury: Treasury::new(
                    Address::from_label("driver"),
                    Address::from_label("halter"),
                    Address::from_label("governor"),
                ),
                now: 600,
            }
        }

        fn deliver(&mut self, from: Address, value: Amount, op: Op) -> (ActorResult, Vec<OutMessage>) {
            let msg = Message::new(from, self.address, value.clone(), op);
            let fees = self.config.fee_model();
            let compute = fees.compute_fee(fees.gas_for(&msg));
            // Plenty of balance besides the inbound value
            let balance = value.clone() + Amount::from_coins(1_000_000);
            let mut ctx = Context::new(self.address, self.now, &self.config, value, compute, balance);
            let snapshot = self.treasury.clone();
            let result = self.treasury.receive(&mut ctx, &msg);
            if result.is_err() {
                self.treasury = snapshot;
            }
            let (_, _, outbox) = ctx.into_outbox();
            (result, outbox)
        }

        fn deposit(&mut self, label: &str, coins: u64) {
            let (result, _) = self.deliver(Address::from_label(label), Amount::from_coins(coins), Op::DepositCoins);
            result.unwrap();
        }

        fn request(&mut self, label: &str, loan: u64) -> ActorResult {
            let op = Op::RequestLoan(LoanRequest {
                round_since: self.config.validators.until,
                loan_amount: Amount::from_coins(loan),
                min_payment: Amount::from_coins(50),
                validator_reward_share: 102,
                new_stake_msg: vec![],
            });
            self.deliver(Address::from_label(label), Amount::parse_coins("152.7").unwrap(), op).0
        }
    }

    #[test]
    fn test_deposit_mints_and_forwards() {
        let mut f = Fixture::new();
        let (result, outbox) = f.deliver(Address::from_label("staker"), Amount::from_coins(10), Op::DepositCoins);
        result.unwrap();

        let fee = f.config.fee_model().deposit_coins_fee();
        let coins = Amount::from_coins(10) - fee;
        assert_eq!(f.treasury.state().total_coins, coins);
        assert_eq!(f.treasury.state().total_tokens, coins);
        assert_eq!(outbox.len(), 1);
        assert!(outbox[0].init.is_some());
        assert_eq!(outbox[0].to, wallet_address(&f.address, &Address::from_label("staker")));
    }

    #[test]
    fn test_deposit_below_fee_fails() {
        let mut f = Fixture::new();
        let (result, outbox) = f.deliver(Address::from_label("staker"), Amount::parse_coins("0.01").unwrap(), Op::DepositCoins);
        assert_eq!(result.unwrap_err().code, 102);
        assert!(outbox.is_empty());
        assert!(f.treasury.state().total_tokens.is_zero());
    }

    #[test]
    fn test_stopped_blocks_deposit_and_loans() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        let (result, _) = f.deliver(Address::from_label("halter"), Amount::parse_coins("0.1").unwrap(), Op::SetStopped { stopped: true });
        result.unwrap();

        let before = f.treasury.state().clone();
        let (result, _) = f.deliver(Address::from_label("staker"), Amount::from_coins(10), Op::DepositCoins);
        assert_eq!(result.unwrap_err().code, 101);
        assert_eq!(f.request("validator", 100).unwrap_err().code, 101);
        assert_eq!(f.treasury.state(), &before);
    }

    #[test]
    fn test_loan_moves_coins_to_stake() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        let coins = f.treasury.state().total_coins.clone();

        f.request("validator", 300).unwrap();
        let state = f.treasury.state();
        assert_eq!(state.total_validators_stake, Amount::from_coins(300));
        assert_eq!(state.total_coins, coins - Amount::from_coins(300));

        let record = f.treasury.get_participation(f.config.validators.until).unwrap();
        assert_eq!(record.loans.len(), 1);
    }

    #[test]
    fn test_loan_above_liquidity_fails() {
        let mut f = Fixture::new();
        f.deposit("staker", 100);
        assert_eq!(f.request("validator", 300_000).unwrap_err().code, 103);
        assert!(f.treasury.state().total_validators_stake.is_zero());
        assert!(f.treasury.state().participations.is_empty());
    }

    #[test]
    fn test_loan_outside_window_fails() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        f.now = 100;
        assert_eq!(f.request("validator", 300).unwrap_err().code, 104);
    }

    #[test]
    fn test_repeated_request_replaces_open_loan() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        f.request("validator", 300).unwrap();

        let op = Op::RequestLoan(LoanRequest {
            round_since: f.config.validators.until,
            loan_amount: Amount::from_coins(800),
            min_payment: Amount::from_coins(50),
            validator_reward_share: 102,
            new_stake_msg: vec![],
        });
        let (result, outbox) = f.deliver(Address::from_label("validator"), Amount::parse_coins("152.7").unwrap(), op);
        result.unwrap();

        assert_eq!(f.treasury.state().total_validators_stake, Amount::from_coins(800));
        assert_eq!(outbox.len(), 1);
        assert!(matches!(outbox[0].op, Op::LoanReleased { .. }));
    }

    #[test]
    fn test_participate_forwards_stakes() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        f.request("v1", 300).unwrap();
        f.request("v2", 200).unwrap();

        let round = f.config.validators.until;
        f.now = 900;
        let (result, outbox) = f.deliver(Address::from_label("driver"), Amount::from_coins(1), Op::ParticipateInElection { round_since: round });
        result.unwrap();

        let stakes: Vec<&OutMessage> = outbox.iter().filter(|m| matches!(m.op, Op::NewStake { .. })).collect();
        assert_eq!(stakes.len(), 2);
        assert!(stakes.iter().all(|m| m.to == f.config.elector));

        // Closed rounds reject new and repeated requests
        f.now = 600;
        assert_eq!(f.request("v1", 10).unwrap_err().code, 106);
        assert_eq!(f.request("v3", 10).unwrap_err().code, 104);
    }

    #[test]
    fn test_settle_requires_elector() {
        let mut f = Fixture::new();
        let op = Op::SettleRound { round_since: 1_024, outcomes: vec![] };
        let (result, _) = f.deliver(Address::from_label("mallory"), Amount::from_coins(1), op);
        assert_eq!(result.unwrap_err().code, 105);
    }

    #[test]
    fn test_settle_round_repays_pool() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        f.request("v1", 300).unwrap();
        let round = f.config.validators.until;
        f.now = 900;
        f.deliver(Address::from_label("driver"), Amount::from_coins(1), Op::ParticipateInElection { round_since: round }).0.unwrap();
        let coins_before = f.treasury.state().total_coins.clone();

        f.now = 2_000;
        let outcome = LoanOutcome::rewarded(Address::from_label("v1"), Amount::from_coins(1_020));
        let op = Op::SettleRound { round_since: round, outcomes: vec![outcome.clone()] };
        let elector = f.config.elector;
        let (result, outbox) = f.deliver(elector, Amount::from_coins(1_321), op.clone());
        result.unwrap();

        let state = f.treasury.state();
        assert!(state.total_validators_stake.is_zero());
        assert_eq!(state.total_coins, coins_before + Amount::from_coins(300 + 612));
        assert!(state.participations.is_empty());
        assert_eq!(f.treasury.get_reward(round).unwrap().profit, Amount::from_coins(612));
        assert!(outbox.iter().any(|m| matches!(m.op, Op::LoanSettled { .. })));

        // A second report changes nothing and returns the value
        let coins = f.treasury.state().total_coins.clone();
        let (result, outbox) = f.deliver(elector, Amount::from_coins(1_321), op);
        result.unwrap();
        assert_eq!(f.treasury.state().total_coins, coins);
        assert_eq!(outbox.len(), 1);
        assert!(matches!(outbox[0].op, Op::GasExcess));
    }

    #[test]
    fn test_settle_with_short_value_fails() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        f.request("v1", 300).unwrap();
        let round = f.config.validators.until;
        f.now = 900;
        f.deliver(Address::from_label("driver"), Amount::from_coins(1), Op::ParticipateInElection { round_since: round }).0.unwrap();

        let op = Op::SettleRound { round_since: round, outcomes: vec![LoanOutcome::not_elected(Address::from_label("v1"))] };
        let (result, _) = f.deliver(f.config.elector, Amount::from_coins(10), op);
        assert_eq!(result.unwrap_err().code, 102);
        assert_eq!(f.treasury.state().total_validators_stake, Amount::from_coins(300));
    }

    #[test]
    fn test_governance_roles() {
        let mut f = Fixture::new();
        let value = Amount::parse_coins("0.1").unwrap();
        let new_governor = Address::from_label("newGovernor");

        let (result, outbox) = f.deliver(Address::from_label("governor"), value.clone(), Op::ProposeGovernor { new_governor });
        result.unwrap();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(outbox[0].op, Op::GasExcess));
        assert_eq!(f.treasury.state().proposed_governor, Some(new_governor));

        let (result, _) = f.deliver(Address::from_label("mallory"), value.clone(), Op::AcceptGovernance);
        assert_eq!(result.unwrap_err().code, 105);

        let (result, _) = f.deliver(new_governor, value.clone(), Op::AcceptGovernance);
        result.unwrap();
        assert_eq!(f.treasury.state().governor, new_governor);
        assert!(f.treasury.state().proposed_governor.is_none());

        let (result, _) = f.deliver(Address::from_label("governor"), value, Op::SetDriver { new_driver: new_governor });
        assert_eq!(result.unwrap_err().code, 105);
    }

    #[test]
    fn test_max_punishment_query() {
        let f = Fixture::new();
        let mut config = ChainConfig::test();
        config.validators = ValidatorSetTiming { since: 0, until: 1_024 };
        assert_eq!(
            f.treasury.get_max_punishment(&config, &Amount::from_coins(300_000)),
            Amount::from_coins(101)
        );
    }

    #[test]
    fn test_missed_round_is_released() {
        let mut f = Fixture::new();
        f.deposit("staker", 1_000);
        f.request("validator", 300).unwrap();
        let round = f.config.validators.until;

        f.config.validators = ValidatorSetTiming { since: 1_024, until: 2_048 };
        f.now = 1_100;
        let (result, outbox) = f.deliver(
            Address::from_label("driver"),
            Amount::from_coins(1),
            Op::ParticipateInElection { round_since: round },
        );
        result.unwrap();

        assert!(outbox.iter().any(|m| m.to == Address::from_label("validator")
            && m.op == Op::LoanReleased { round_since: round }));
        assert!(outbox.iter().all(|m| m.op.opcode() != pool_core::opcodes::NEW_STAKE));
        let state = f.treasury.state();
        assert!(state.total_validators_stake.is_zero());
        assert!(state.participations.is_empty());
    }

    #[test]
    fn test_fee_time_and_address_queries() {
        let f = Fixture::new();
        let fees = f.treasury.get_fees(&f.config.fee_model());
        assert_eq!(fees.wallet_storage, Amount::parse_coins("0.0256").unwrap());
        assert_eq!(fees.deposit_coins_fee, f.config.fee_model().deposit_coins_fee());

        let times = f.treasury.get_times(&f.config);
        assert_eq!(times.next_round_since, 1_024);
        assert!(times.accepts_requests(f.now));

        let owner = Address::from_label("staker");
        assert_eq!(
            f.treasury.get_wallet_address(&f.address, &owner),
            wallet_address(&f.address, &owner)
        );
    }
}
