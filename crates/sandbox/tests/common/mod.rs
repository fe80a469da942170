#![allow(dead_code)]

use pool_core::{Amount, ChainConfig, Fees, LoanRequest, Op, Timestamp, ValidatorSetTiming};
use pool_crypto::Address;
use sandbox::{ConsensusStub, Sandbox, SendResult, TxPattern};
use treasury::{wallet_address, PoolState, Treasury, WalletState, Wallet};

pub fn coins(s: &str) -> Amount {
    Amount::parse_coins(s).unwrap()
}

/// A deployed treasury with its role accounts, as after `sendDeploy` plus
/// the storage top-up
pub struct Pool {
    pub sandbox: Sandbox,
    pub treasury: Address,
    pub governor: Address,
    pub halter: Address,
    pub driver: Address,
    pub authority: Address,
    pub fees: Fees,
}

impl Pool {
    pub fn new() -> Self {
        let mut sandbox = Sandbox::new(ChainConfig::test());
        sandbox.set_now(600);
        let governor = sandbox.treasury("governor");
        let halter = sandbox.treasury("halter");
        let driver = sandbox.treasury("driver");
        let authority = sandbox.treasury("authority");
        let deployer = sandbox.treasury("deployer");
        let treasury = Address::from_label("treasury");

        let result = sandbox
            .deploy(deployer, treasury, coins("0.01"), Op::TopUp, Box::new(Treasury::new(driver, halter, governor)))
            .unwrap();
        result.expect_transaction(
            &TxPattern::new()
                .from(deployer)
                .to(treasury)
                .value(coins("0.01"))
                .opcode(pool_core::opcodes::TOP_UP)
                .deploy(true)
                .success(true)
                .out_messages(0),
        );
        assert_eq!(result.len(), 2);

        let fees = sandbox.fees().fees();
        sandbox.send(deployer, treasury, fees.treasury_storage.clone(), Op::TopUp).unwrap();

        Self { sandbox, treasury, governor, halter, driver, authority, fees }
    }

    /// Also deploy the elector stand-in
    pub fn with_elector() -> Self {
        let mut pool = Self::new();
        let elector = pool.sandbox.config().elector;
        let authority = pool.authority;
        pool.sandbox
            .deploy(authority, elector, coins("1"), Op::TopUp, Box::new(ConsensusStub::new(authority)))
            .unwrap();
        assert!(pool.sandbox.is_deployed(&elector));
        pool
    }

    pub fn elector(&self) -> Address {
        self.sandbox.config().elector
    }

    pub fn state(&self) -> &PoolState {
        self.sandbox.get::<Treasury>(&self.treasury).unwrap().state()
    }

    pub fn wallet(&self, owner: &Address) -> Option<&WalletState> {
        self.sandbox
            .get::<Wallet>(&wallet_address(&self.treasury, owner))
            .map(|w| w.get_wallet_state())
    }

    pub fn next_round(&self) -> Timestamp {
        self.sandbox.config().validators.until
    }

    pub fn send(&mut self, from: Address, value: Amount, op: Op) -> SendResult {
        let to = self.treasury;
        self.sandbox.send(from, to, value, op).unwrap()
    }

    pub fn deposit(&mut self, label: &str, value: &str) -> (Address, SendResult) {
        let staker = self.sandbox.treasury(label);
        let result = self.send(staker, coins(value), Op::DepositCoins);
        (staker, result)
    }

    pub fn request_loan(&mut self, label: &str, loan: u64) -> (Address, SendResult) {
        let validator = self.sandbox.treasury(label);
        let op = Op::RequestLoan(LoanRequest {
            round_since: self.next_round(),
            loan_amount: Amount::from_coins(loan),
            min_payment: Amount::from_coins(50),
            validator_reward_share: 102,
            new_stake_msg: vec![],
        });
        // 101 (max punishment) + 50 (min payment) + fees
        let result = self.send(validator, coins("152.7"), op);
        (validator, result)
    }

    pub fn participate(&mut self) -> SendResult {
        let driver = self.driver;
        let round_since = self.next_round();
        self.send(driver, coins("1"), Op::ParticipateInElection { round_since })
    }

    pub fn withdraw(&mut self, owner: Address, tokens: Amount) -> SendResult {
        let wallet = wallet_address(&self.treasury, &owner);
        self.sandbox.send(owner, wallet, coins("1"), Op::Withdraw { tokens }).unwrap()
    }

    pub fn report(&mut self, round_since: Timestamp, outcomes: Vec<pool_core::LoanOutcome>) -> SendResult {
        let authority = self.authority;
        let elector = self.elector();
        let value = ConsensusStub::report_value(&outcomes);
        let op = Op::ReportOutcomes { treasury: self.treasury, round_since, outcomes };
        self.sandbox.send(authority, elector, value, op).unwrap()
    }

    pub fn set_validators(&mut self, since: Timestamp) {
        let elected_for = self.sandbox.config().elections.elected_for;
        self.sandbox.set_validators(ValidatorSetTiming { since, until: since + elected_for });
    }

    /// Balances plus collected fees equal everything ever minted
    pub fn assert_conserved(&self) {
        let total = self.sandbox.total_balances() + self.sandbox.fees_collected().clone();
        assert_eq!(&total, self.sandbox.minted());
    }

    /// The treasury can always pay out the coins it accounts for
    pub fn assert_solvent(&self) {
        assert!(self.sandbox.balance(&self.treasury) >= self.state().total_coins);
    }
}
