mod common;

use common::{coins, Pool};
use pool_core::{opcodes, Amount, LoanOutcome, Op};
use sandbox::TxPattern;
use treasury::RoundState;

/// Deposit 1000, request a loan of `loan` at 600 and forward it at 900
fn staked_round(loan: u64) -> (Pool, pool_crypto::Address, pool_crypto::Address) {
    let mut pool = Pool::with_elector();
    let (staker, _) = pool.deposit("staker", "1000");
    let (validator, result) = pool.request_loan("validator", loan);
    result.expect_transaction(&TxPattern::new().from(validator).to(pool.treasury).success(true).out_messages(0));

    pool.sandbox.set_now(900);
    let result = pool.participate();
    let elector = pool.elector();
    result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(elector).opcode(opcodes::NEW_STAKE).success(true),
    );
    (pool, staker, validator)
}

#[test]
fn test_loan_request_locks_liquidity() {
    let mut pool = Pool::with_elector();
    pool.deposit("staker", "1000");
    let coins_before = pool.state().total_coins.clone();

    let (validator, _) = pool.request_loan("validator", 300);
    let state = pool.state();
    assert_eq!(state.total_validators_stake, Amount::from_coins(300));
    assert_eq!(state.total_coins, coins_before - Amount::from_coins(300));

    let record = state.participations.get(&pool.next_round()).unwrap();
    assert_eq!(record.state, RoundState::Open);
    let loan = record.loan(&validator).unwrap();
    assert_eq!(loan.escrow, coins("152.7") - pool.fees.request_loan_fee.clone());
    pool.assert_solvent();
}

#[test]
fn test_loan_request_outside_window_bounces() {
    let mut pool = Pool::with_elector();
    pool.deposit("staker", "1000");
    pool.sandbox.set_now(100);

    let (validator, result) = pool.request_loan("validator", 300);
    result.expect_transaction(&TxPattern::new().from(validator).success(false).exit_code(104));
    result.expect_transaction(&TxPattern::new().to(validator).opcode(opcodes::BOUNCE));
    assert!(pool.state().participations.is_empty());
    pool.assert_conserved();
}

#[test]
fn test_participation_forwards_stake() {
    let (pool, _, validator) = staked_round(300);
    let round = pool.next_round();

    let record = pool.state().participations.get(&round).unwrap();
    assert_eq!(record.state, RoundState::Closed);

    let elector = pool.elector();
    let stub = pool.sandbox.get::<sandbox::ConsensusStub>(&elector).unwrap();
    let held = stub.held(round, &validator).unwrap();
    assert_eq!(held.amount, Amount::from_coins(300));
    assert_eq!(held.treasury, pool.treasury);
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_participation_returns_excess_to_driver() {
    let mut pool = Pool::with_elector();
    pool.deposit("staker", "1000");
    pool.request_loan("validator", 300);
    pool.sandbox.set_now(900);

    let result = pool.participate();
    let excess = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(pool.driver).opcode(opcodes::GAS_EXCESS),
    );
    assert!(excess.value > coins("0.9"));
    assert!(excess.value < coins("1"));
}

#[test]
fn test_rewarded_round_settles() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    let coins_before = pool.state().total_coins.clone();
    let escrow = pool.state().participations[&round].loan(&validator).unwrap().escrow.clone();

    pool.sandbox.set_now(2_100);
    let reward = Amount::from_coins(1_020);
    let result = pool.report(round, vec![LoanOutcome::rewarded(validator, reward.clone())]);

    let elector = pool.elector();
    result.expect_transaction(
        &TxPattern::new().from(elector).to(pool.treasury).opcode(opcodes::SETTLE_ROUND).success(true).out_messages(2),
    );
    // 40% of the reward plus the escrow, less the pool's cut of 612
    let payout = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(validator).opcode(opcodes::LOAN_SETTLED),
    );
    assert_eq!(payout.value, escrow + reward - Amount::from_coins(612));

    let state = pool.state();
    assert!(state.total_validators_stake.is_zero());
    assert_eq!(state.total_coins, coins_before + Amount::from_coins(300 + 612));
    assert!(state.participations.is_empty());

    let record = state.rewards_history.get(round).unwrap();
    assert_eq!(record.profit, Amount::from_coins(612));
    assert!(record.loss.is_zero());
    assert!(state.exchange_rate() > rust_decimal::Decimal::ONE);

    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_punished_round_takes_min_payment_from_escrow() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    let coins_before = pool.state().total_coins.clone();
    let escrow = pool.state().participations[&round].loan(&validator).unwrap().escrow.clone();

    pool.sandbox.set_now(2_100);
    let punishment = Amount::from_coins(120);
    let result = pool.report(round, vec![LoanOutcome::punished(validator, punishment.clone())]);

    // Escrow covers the fine and what is left pays the minimum payment
    let min_payment = escrow - punishment;
    assert!(min_payment < Amount::from_coins(50));
    assert!(!result.has_transaction(&TxPattern::new().to(validator).opcode(opcodes::LOAN_SETTLED)));

    let state = pool.state();
    assert_eq!(state.total_coins, coins_before + Amount::from_coins(300) + min_payment.clone());
    let record = state.rewards_history.get(round).unwrap();
    assert_eq!(record.profit, min_payment);
    assert!(record.loss.is_zero());
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_punishment_beyond_escrow_is_a_loss() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    let coins_before = pool.state().total_coins.clone();
    let escrow = pool.state().participations[&round].loan(&validator).unwrap().escrow.clone();

    pool.sandbox.set_now(2_100);
    let punishment = Amount::from_coins(250);
    pool.report(round, vec![LoanOutcome::punished(validator, punishment.clone())]);

    let loss = punishment - escrow;
    let state = pool.state();
    assert_eq!(state.total_coins, coins_before + Amount::from_coins(300) - loss.clone());
    assert_eq!(state.rewards_history.get(round).unwrap().loss, loss);
    assert!(state.exchange_rate() < rust_decimal::Decimal::ONE);
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_not_elected_returns_escrow() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    let coins_before = pool.state().total_coins.clone();
    let escrow = pool.state().participations[&round].loan(&validator).unwrap().escrow.clone();

    pool.sandbox.set_now(2_100);
    let result = pool.report(round, vec![LoanOutcome::not_elected(validator)]);
    let payout = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(validator).opcode(opcodes::LOAN_SETTLED),
    );
    assert_eq!(payout.value, escrow);
    assert_eq!(pool.state().total_coins, coins_before + Amount::from_coins(300));
    assert!(pool.state().rewards_history.get(round).unwrap().profit.is_zero());
}

#[test]
fn test_repeated_report_changes_nothing() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    pool.sandbox.set_now(2_100);
    let outcomes = vec![LoanOutcome::rewarded(validator, Amount::from_coins(1_020))];
    pool.report(round, outcomes.clone());
    let settled = pool.state().clone();

    let result = pool.report(round, outcomes);
    let elector = pool.elector();
    result.expect_transaction(&TxPattern::new().from(elector).to(pool.treasury).success(true).out_messages(1));
    result.expect_transaction(&TxPattern::new().from(pool.treasury).to(elector).opcode(opcodes::GAS_EXCESS));
    assert!(!result.has_transaction(&TxPattern::new().to(validator)));
    assert_eq!(pool.state(), &settled);
    pool.assert_conserved();
}

#[test]
fn test_report_requires_authority() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    let mallory = pool.sandbox.treasury("mallory");
    let elector = pool.elector();

    let op = Op::ReportOutcomes {
        treasury: pool.treasury,
        round_since: round,
        outcomes: vec![LoanOutcome::rewarded(validator, Amount::from_coins(1))],
    };
    let result = pool.sandbox.send(mallory, elector, coins("2"), op).unwrap();
    result.expect_transaction(&TxPattern::new().from(mallory).to(elector).success(false).exit_code(202));
    assert_eq!(pool.state().total_validators_stake, Amount::from_coins(300));
}

#[test]
fn test_settlement_not_from_elector_fails() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    let mallory = pool.sandbox.treasury("mallory");

    let op = Op::SettleRound { round_since: round, outcomes: vec![LoanOutcome::not_elected(validator)] };
    let result = pool.send(mallory, Amount::from_coins(400), op);
    result.expect_transaction(&TxPattern::new().from(mallory).success(false).exit_code(105));
    assert_eq!(pool.state().total_validators_stake, Amount::from_coins(300));
}

#[test]
fn test_refused_stake_releases_loan() {
    // No elector deployed: the stake bounces back
    let mut pool = Pool::new();
    pool.deposit("staker", "1000");
    let coins_before = pool.state().total_coins.clone();
    let (validator, _) = pool.request_loan("validator", 300);
    let round = pool.next_round();
    let escrow = pool.state().participations[&round].loan(&validator).unwrap().escrow.clone();

    pool.sandbox.set_now(900);
    let result = pool.participate();
    let elector = pool.elector();
    result.expect_transaction(&TxPattern::new().to(elector).success(false).out_messages(1));
    result.expect_transaction(
        &TxPattern::new().from(elector).to(pool.treasury).opcode(opcodes::BOUNCE).success(true).out_messages(1),
    );
    let released = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(validator).opcode(opcodes::LOAN_RELEASED),
    );
    assert!(released.value < escrow);
    assert!(released.value > escrow - coins("0.01"));

    let state = pool.state();
    assert!(state.total_validators_stake.is_zero());
    assert_eq!(state.total_coins, coins_before);
    assert!(state.participations.is_empty());
    assert!(state.rewards_history.get(round).is_some());
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_replaced_request_releases_old_escrow() {
    let mut pool = Pool::with_elector();
    pool.deposit("staker", "1000");
    let (validator, _) = pool.request_loan("validator", 300);
    let (_, result) = pool.request_loan("validator", 500);

    result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(validator).opcode(opcodes::LOAN_RELEASED).success(true),
    );
    let state = pool.state();
    assert_eq!(state.total_validators_stake, Amount::from_coins(500));
    let record = state.participations.get(&pool.next_round()).unwrap();
    assert_eq!(record.loans.len(), 1);
    assert_eq!(record.total_loan, Amount::from_coins(500));
    pool.assert_solvent();
}

#[test]
fn test_queued_withdrawal_paid_on_settlement() {
    let (mut pool, staker, validator) = staked_round(900);
    let round = pool.next_round();
    let tokens = pool.wallet(&staker).unwrap().token_balance.clone();

    // Most coins are lent out, so the withdrawal waits
    pool.sandbox.set_now(1_100);
    let result = pool.withdraw(staker, tokens.clone());
    assert!(!result.has_transaction(&TxPattern::new().to(staker).opcode(opcodes::WITHDRAWAL)));
    assert_eq!(pool.state().total_unstaking, tokens);
    assert_eq!(pool.state().unstake_queue.len(), 1);
    assert_eq!(pool.wallet(&staker).unwrap().unstaking_pending, tokens);

    pool.sandbox.set_now(2_100);
    let result = pool.report(round, vec![LoanOutcome::not_elected(validator)]);
    let payout = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(staker).opcode(opcodes::WITHDRAWAL),
    );
    assert!(payout.value > tokens);

    let state = pool.state();
    assert!(state.unstake_queue.is_empty());
    assert!(state.total_unstaking.is_zero());
    assert!(state.total_tokens.is_zero());
    assert!(pool.wallet(&staker).unwrap().token_balance.is_zero());
    pool.assert_conserved();
}

#[test]
fn test_outcomes_in_history_match_results() {
    let (mut pool, _, validator) = staked_round(300);
    let round = pool.next_round();
    pool.sandbox.set_now(2_100);
    pool.report(round, vec![LoanOutcome::rewarded(validator, Amount::from_coins(10))]);

    // Rewards below the minimum payment still pay the minimum
    let record = pool.state().rewards_history.get(round).unwrap();
    assert_eq!(record.profit, Amount::from_coins(50));
    assert_eq!(pool.state().rewards_history.latest().map(|r| r.round_since), Some(round));
}

#[test]
fn test_missed_election_releases_loans() {
    let mut pool = Pool::with_elector();
    pool.deposit("staker", "1000");
    let coins_before = pool.state().total_coins.clone();
    let (validator, _) = pool.request_loan("validator", 300);
    let round = pool.next_round();
    let escrow = pool.state().participations[&round].loan(&validator).unwrap().escrow.clone();

    // Nobody forwarded the stakes before the round started
    pool.sandbox.set_now(1_100);
    pool.set_validators(1_024);
    let driver = pool.driver;
    let result = pool.send(driver, coins("1"), Op::ParticipateInElection { round_since: round });
    result.expect_transaction(&TxPattern::new().from(driver).to(pool.treasury).success(true));
    let released = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(validator).opcode(opcodes::LOAN_RELEASED),
    );
    assert!(released.value < escrow);
    assert!(released.value > escrow - coins("0.01"));
    result.expect_transaction(&TxPattern::new().from(pool.treasury).to(driver).opcode(opcodes::GAS_EXCESS));
    assert!(!result.has_transaction(&TxPattern::new().opcode(opcodes::NEW_STAKE)));

    let state = pool.state();
    assert!(state.total_validators_stake.is_zero());
    assert_eq!(state.total_coins, coins_before);
    assert!(state.participations.is_empty());
    assert!(state.rewards_history.get(round).is_none());
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_next_request_releases_missed_round() {
    let mut pool = Pool::with_elector();
    pool.deposit("staker", "1000");
    let (first, _) = pool.request_loan("validator", 900);
    let missed = pool.next_round();

    // Two sets later the old loan still holds the liquidity the new one needs
    pool.sandbox.set_now(1_600);
    pool.set_validators(1_024);
    let (second, result) = pool.request_loan("validator2", 900);
    result.expect_transaction(&TxPattern::new().from(second).to(pool.treasury).success(true));
    result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(first).opcode(opcodes::LOAN_RELEASED).success(true),
    );

    let state = pool.state();
    assert_eq!(state.total_validators_stake, Amount::from_coins(900));
    assert!(state.participations.get(&missed).is_none());
    let record = state.participations.get(&pool.next_round()).unwrap();
    assert!(record.loan(&second).is_some());
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_queued_withdrawal_paid_after_refused_stake() {
    // No elector deployed: the stake bounces back
    let mut pool = Pool::new();
    let (staker, _) = pool.deposit("staker", "1000");
    pool.sandbox.set_now(1_600);
    pool.set_validators(1_024);
    pool.request_loan("validator", 900);

    let tokens = pool.wallet(&staker).unwrap().token_balance.clone();
    let result = pool.withdraw(staker, tokens.clone());
    assert!(!result.has_transaction(&TxPattern::new().to(staker).opcode(opcodes::WITHDRAWAL)));
    assert_eq!(pool.state().unstake_queue.len(), 1);

    pool.sandbox.set_now(1_950);
    let result = pool.participate();
    let payout = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(staker).opcode(opcodes::WITHDRAWAL),
    );
    assert!(payout.value > tokens);
    let wallet = treasury::wallet_address(&pool.treasury, &staker);
    result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(wallet).opcode(opcodes::WITHDRAW_CONFIRMED).success(true),
    );

    let state = pool.state();
    assert!(state.total_validators_stake.is_zero());
    assert!(state.unstake_queue.is_empty());
    assert!(state.total_unstaking.is_zero());
    assert!(state.total_tokens.is_zero());
    assert!(pool.wallet(&staker).unwrap().token_balance.is_zero());
    pool.assert_solvent();
    pool.assert_conserved();
}

#[test]
fn test_deposit_pays_queued_withdrawal() {
    let (mut pool, staker, _) = staked_round(900);
    let tokens = pool.wallet(&staker).unwrap().token_balance.clone();

    pool.sandbox.set_now(1_100);
    pool.withdraw(staker, tokens.clone());
    assert_eq!(pool.state().unstake_queue.len(), 1);

    // Fresh liquidity from another depositor clears the queue
    let (_, result) = pool.deposit("carol", "1000");
    let payout = result.expect_transaction(
        &TxPattern::new().from(pool.treasury).to(staker).opcode(opcodes::WITHDRAWAL),
    );
    assert!(payout.value > tokens);
    assert!(pool.state().unstake_queue.is_empty());
    assert!(pool.state().total_unstaking.is_zero());
    assert_eq!(pool.state().total_validators_stake, Amount::from_coins(900));
    pool.assert_solvent();
    pool.assert_conserved();
}
