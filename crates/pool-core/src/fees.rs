// pool-core/src/fees.rs

use crate::{message::{Message, Op}, types::*};
use serde::{Deserialize, Serialize};

/// Gas units
pub type Gas = u64;

/// Persistent size of a wallet shard, in bytes
pub const WALLET_STATE_BYTES: u64 = 256;

/// Persistent size of one loan record, in bytes
pub const LOAN_RECORD_BYTES: u64 = 512;

/// Persistent size of the treasury state, in bytes
pub const TREASURY_STATE_BYTES: u64 = 4_096;

/// Message size assumed when a fee is quoted before the message exists
pub const NOMINAL_MESSAGE_BYTES: u64 = 128;

/// Size of a `NewStake` message without its opaque payload (upper bound)
pub const NEW_STAKE_BASE_BYTES: u64 = 128;

/// Network fee parameters (all prices in nano-coins)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Price of one gas unit
    pub gas_price: u64,
    /// Flat price of forwarding any message
    pub lump_price: u64,
    /// Price per forwarded byte
    pub byte_price: u64,
    /// Reserve required per stored byte
    pub storage_byte_price: u64,
    /// Fee kept by the consensus layer for every stake
    pub new_stake_fee: Amount,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            gas_price: 1_000,
            lump_price: 1_000_000,
            byte_price: 1_000,
            storage_byte_price: 100_000,
            new_stake_fee: Amount::from_coins(1),
        }
    }
}

/// Gas consumed by each handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    pub top_up: Gas,
    pub deposit_coins: Gas,
    pub save_coins: Gas,
    pub withdraw: Gas,
    pub burn_tokens: Gas,
    pub withdraw_confirmed: Gas,
    pub request_loan: Gas,
    pub participate_base: Gas,
    pub participate_per_loan: Gas,
    pub new_stake: Gas,
    pub report_outcomes: Gas,
    pub settle_base: Gas,
    pub settle_per_loan: Gas,
    pub governance: Gas,
    /// Bounced messages and ops the recipient does not handle
    pub bounce: Gas,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            top_up: 2_000,
            deposit_coins: 12_000,
            save_coins: 10_000,
            withdraw: 8_000,
            burn_tokens: 14_000,
            withdraw_confirmed: 8_000,
            request_loan: 30_000,
            participate_base: 10_000,
            participate_per_loan: 8_000,
            new_stake: 10_000,
            report_outcomes: 10_000,
            settle_base: 10_000,
            settle_per_loan: 10_000,
            governance: 6_000,
            bounce: 4_000,
        }
    }
}

/// Fee schedule as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub deposit_coins_fee: Amount,
    pub withdraw_fee: Amount,
    /// Quoted for an empty stake payload
    pub request_loan_fee: Amount,
    pub governance_fee: Amount,
    pub wallet_storage: Amount,
    pub loan_storage: Amount,
    pub treasury_storage: Amount,
    pub new_stake_fee: Amount,
}

/// Pure fee calculator
#[derive(Debug, Clone)]
pub struct FeeModel {
    config: FeeConfig,
    gas: GasSchedule,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self::new(FeeConfig::default(), GasSchedule::default())
    }
}

impl FeeModel {
    pub fn new(config: FeeConfig, gas: GasSchedule) -> Self {
        Self { config, gas }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    pub fn gas(&self) -> &GasSchedule {
        &self.gas
    }

    /// Cost of burning `gas` units
    pub fn compute_fee(&self, gas: Gas) -> Amount {
        Amount::from_nano(gas).mul_ratio(self.config.gas_price, 1)
            .unwrap_or_else(Amount::zero)
    }

    /// Cost of forwarding a message of `bytes` bytes
    pub fn forward_fee_for_size(&self, bytes: u64) -> Amount {
        Amount::from_nano(self.config.lump_price)
            + Amount::from_nano(bytes).mul_ratio(self.config.byte_price, 1).unwrap_or_else(Amount::zero)
    }

    /// Cost of forwarding `op`
    pub fn forward_fee(&self, op: &Op) -> Amount {
        self.forward_fee_for_size(op.encoded_len())
    }

    /// Forwarding cost quoted for a message not built yet
    pub fn nominal_forward_fee(&self) -> Amount {
        self.forward_fee_for_size(NOMINAL_MESSAGE_BYTES)
    }

    /// Gas charged to the recipient of `msg`
    pub fn gas_for(&self, msg: &Message) -> Gas {
        if msg.bounced {
            return self.gas.bounce;
        }
        let g = &self.gas;
        match &msg.op {
            Op::TopUp => g.top_up,
            Op::DepositCoins => g.deposit_coins,
            Op::SaveCoins { .. } => g.save_coins,
            Op::Withdraw { .. } => g.withdraw,
            Op::BurnTokens { .. } => g.burn_tokens,
            Op::WithdrawConfirmed { .. } => g.withdraw_confirmed,
            Op::RequestLoan(_) => g.request_loan,
            Op::ParticipateInElection { .. } => g.participate_base,
            Op::NewStake { .. } => g.new_stake,
            Op::ReportOutcomes { .. } => g.report_outcomes,
            Op::SettleRound { outcomes, .. } => self.settle_gas(outcomes.len()),
            Op::ProposeGovernor { .. }
            | Op::AcceptGovernance
            | Op::SetHalter { .. }
            | Op::SetDriver { .. }
            | Op::SetContent { .. }
            | Op::SetStopped { .. }
            | Op::SetRewardShare { .. } => g.governance,
            Op::GasExcess
            | Op::Withdrawal { .. }
            | Op::LoanReleased { .. }
            | Op::LoanSettled { .. } => g.bounce,
        }
    }

    pub fn settle_gas(&self, outcomes: usize) -> Gas {
        self.gas.settle_base + self.gas.settle_per_loan * outcomes as Gas
    }

    fn storage_fee(&self, bytes: u64) -> Amount {
        Amount::from_nano(bytes).mul_ratio(self.config.storage_byte_price, 1)
            .unwrap_or_else(Amount::zero)
    }

    /// Minimum balance a wallet shard keeps
    pub fn wallet_storage(&self) -> Amount {
        self.storage_fee(WALLET_STATE_BYTES)
    }

    /// Reserve kept by the treasury for each loan record
    pub fn loan_storage(&self) -> Amount {
        self.storage_fee(LOAN_RECORD_BYTES)
    }

    /// Minimum balance the treasury keeps
    pub fn treasury_storage(&self) -> Amount {
        self.storage_fee(TREASURY_STATE_BYTES)
    }

    /// Deposit handling, wallet creation and the gas excess return
    pub fn deposit_coins_fee(&self) -> Amount {
        self.compute_fee(self.gas.deposit_coins)
            + self.nominal_forward_fee()
            + self.wallet_storage()
            + self.compute_fee(self.gas.save_coins)
            + self.nominal_forward_fee()
    }

    /// Whole withdraw round trip: wallet, treasury, confirmation, payout
    pub fn withdraw_fee(&self) -> Amount {
        let gas = self.gas.withdraw + self.gas.burn_tokens + self.gas.withdraw_confirmed;
        self.compute_fee(gas) + self.nominal_forward_fee().mul_ratio(4, 1).unwrap_or_else(Amount::zero)
    }

    /// Part of the value the treasury forwards with `WithdrawConfirmed`
    pub fn withdraw_confirm_value(&self) -> Amount {
        self.compute_fee(self.gas.withdraw_confirmed) + self.nominal_forward_fee()
    }

    /// Everything a loan costs the treasury besides the loan itself
    pub fn request_loan_fee(&self, new_stake_payload_len: usize) -> Amount {
        self.compute_fee(self.gas.request_loan)
            + self.loan_storage()
            + self.compute_fee(self.gas.participate_per_loan)
            + self.new_stake_forward_fee(new_stake_payload_len)
            + self.config.new_stake_fee.clone()
            + self.compute_fee(self.gas.settle_per_loan)
            + self.nominal_forward_fee()
    }

    /// Quoted forwarding cost of a `NewStake` carrying `payload_len` bytes
    pub fn new_stake_forward_fee(&self, payload_len: usize) -> Amount {
        self.forward_fee_for_size(NEW_STAKE_BASE_BYTES + payload_len as u64)
    }

    pub fn governance_fee(&self) -> Amount {
        self.compute_fee(self.gas.governance) + self.nominal_forward_fee()
    }

    pub fn new_stake_fee(&self) -> Amount {
        self.config.new_stake_fee.clone()
    }

    pub fn fees(&self) -> Fees {
        Fees {
            deposit_coins_fee: self.deposit_coins_fee(),
            withdraw_fee: self.withdraw_fee(),
            request_loan_fee: self.request_loan_fee(0),
            governance_fee: self.governance_fee(),
            wallet_storage: self.wallet_storage(),
            loan_storage: self.loan_storage(),
            treasury_storage: self.treasury_storage(),
            new_stake_fee: self.new_stake_fee(),
        }
    }
}
