// pool-core/src/message.rs

use crate::{types::*, CoreResult};
use pool_crypto::Address;
use serde::{Deserialize, Serialize};

/// 32-bit operation codes carried at the head of every message body
pub mod opcodes {
    pub const TOP_UP: u32 = 0x34e5_d45a;
    pub const GAS_EXCESS: u32 = 0x6edd_65f0;
    pub const DEPOSIT_COINS: u32 = 0x3d3c_d2ad;
    pub const SAVE_COINS: u32 = 0x7f30_ee55;
    pub const WITHDRAW: u32 = 0x469b_fe5b;
    pub const BURN_TOKENS: u32 = 0x5b42_ad98;
    pub const WITHDRAW_CONFIRMED: u32 = 0x2c97_9f6c;
    pub const WITHDRAWAL: u32 = 0x0a77_535c;
    pub const REQUEST_LOAN: u32 = 0x12b8_08d3;
    pub const PARTICIPATE_IN_ELECTION: u32 = 0x574a_297b;
    pub const NEW_STAKE: u32 = 0x4e73_744b;
    pub const LOAN_RELEASED: u32 = 0x1f2d_61c4;
    pub const REPORT_OUTCOMES: u32 = 0x6a0b_c93e;
    pub const SETTLE_ROUND: u32 = 0x4f8e_a6b1;
    pub const LOAN_SETTLED: u32 = 0x0f58_d7b2;
    pub const PROPOSE_GOVERNOR: u32 = 0x76ff_2956;
    pub const ACCEPT_GOVERNANCE: u32 = 0x06e2_37e2;
    pub const SET_HALTER: u32 = 0x4d2d_8c6a;
    pub const SET_DRIVER: u32 = 0x6c76_c3b4;
    pub const SET_CONTENT: u32 = 0x0444_2ed5;
    pub const SET_STOPPED: u32 = 0x0e5e_9773;
    pub const SET_REWARD_SHARE: u32 = 0x5a3f_1b80;

    /// Reported for a message returned by the bounce mechanism
    pub const BOUNCE: u32 = 0xffff_ffff;
}

/// Loan request payload sent by a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    /// Start of the round the validator wants to be elected for
    pub round_since: Timestamp,
    pub loan_amount: Amount,
    pub min_payment: Amount,
    /// Fraction of profit the validator keeps, over `VALIDATOR_SHARE_BASE`
    pub validator_reward_share: u8,
    /// Opaque stake message forwarded to the consensus layer
    pub new_stake_msg: Vec<u8>,
}

/// Result of a finished round for one validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundResult {
    NotElected,
    Rewarded { reward: Amount },
    Punished { punishment: Amount },
}

/// Outcome reported by the round-resolution authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanOutcome {
    pub validator: Address,
    pub result: RoundResult,
}

impl LoanOutcome {
    pub fn not_elected(validator: Address) -> Self {
        Self { validator, result: RoundResult::NotElected }
    }

    pub fn rewarded(validator: Address, reward: Amount) -> Self {
        Self { validator, result: RoundResult::Rewarded { reward } }
    }

    pub fn punished(validator: Address, punishment: Amount) -> Self {
        Self { validator, result: RoundResult::Punished { punishment } }
    }
}

/// Every message body understood by the pool's actors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Adds value to an actor without any other effect
    TopUp,
    /// Return of unused processing value
    GasExcess,

    /// Depositor → treasury
    DepositCoins,
    /// Treasury → wallet: credit freshly minted tokens
    SaveCoins {
        owner: Address,
        coins: Amount,
        tokens: Amount,
        /// Tokens stay locked in `staking_pending` until this time
        unlock_at: Timestamp,
    },

    /// Owner → wallet
    Withdraw { tokens: Amount },
    /// Wallet → treasury
    BurnTokens { owner: Address, tokens: Amount },
    /// Treasury → wallet, after the tokens were burned
    WithdrawConfirmed { tokens: Amount },
    /// Treasury → owner, carries the released coins
    Withdrawal { tokens: Amount },

    /// Validator → treasury
    RequestLoan(LoanRequest),
    /// Anyone → treasury: close the round's requests and stake them
    ParticipateInElection { round_since: Timestamp },
    /// Treasury → consensus layer
    NewStake {
        validator: Address,
        round_since: Timestamp,
        stake: Amount,
        payload: Vec<u8>,
    },
    /// Treasury → validator: escrow returned for a loan that was never staked
    LoanReleased { round_since: Timestamp },

    /// Authority → consensus layer
    ReportOutcomes {
        treasury: Address,
        round_since: Timestamp,
        outcomes: Vec<LoanOutcome>,
    },
    /// Consensus layer → treasury, carries the recovered stakes
    SettleRound {
        round_since: Timestamp,
        outcomes: Vec<LoanOutcome>,
    },
    /// Treasury → validator, carries the validator's part
    LoanSettled { round_since: Timestamp, result: RoundResult },

    ProposeGovernor { new_governor: Address },
    AcceptGovernance,
    SetHalter { new_halter: Address },
    SetDriver { new_driver: Address },
    SetContent { content: Vec<u8> },
    SetStopped { stopped: bool },
    SetRewardShare { reward_share: u16 },
}

impl Op {
    pub fn opcode(&self) -> u32 {
        match self {
            Op::TopUp => opcodes::TOP_UP,
            Op::GasExcess => opcodes::GAS_EXCESS,
            Op::DepositCoins => opcodes::DEPOSIT_COINS,
            Op::SaveCoins { .. } => opcodes::SAVE_COINS,
            Op::Withdraw { .. } => opcodes::WITHDRAW,
            Op::BurnTokens { .. } => opcodes::BURN_TOKENS,
            Op::WithdrawConfirmed { .. } => opcodes::WITHDRAW_CONFIRMED,
            Op::Withdrawal { .. } => opcodes::WITHDRAWAL,
            Op::RequestLoan(_) => opcodes::REQUEST_LOAN,
            Op::ParticipateInElection { .. } => opcodes::PARTICIPATE_IN_ELECTION,
            Op::NewStake { .. } => opcodes::NEW_STAKE,
            Op::LoanReleased { .. } => opcodes::LOAN_RELEASED,
            Op::ReportOutcomes { .. } => opcodes::REPORT_OUTCOMES,
            Op::SettleRound { .. } => opcodes::SETTLE_ROUND,
            Op::LoanSettled { .. } => opcodes::LOAN_SETTLED,
            Op::ProposeGovernor { .. } => opcodes::PROPOSE_GOVERNOR,
            Op::AcceptGovernance => opcodes::ACCEPT_GOVERNANCE,
            Op::SetHalter { .. } => opcodes::SET_HALTER,
            Op::SetDriver { .. } => opcodes::SET_DRIVER,
            Op::SetContent { .. } => opcodes::SET_CONTENT,
            Op::SetStopped { .. } => opcodes::SET_STOPPED,
            Op::SetRewardShare { .. } => opcodes::SET_REWARD_SHARE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::TopUp => "top_up",
            Op::GasExcess => "gas_excess",
            Op::DepositCoins => "deposit_coins",
            Op::SaveCoins { .. } => "save_coins",
            Op::Withdraw { .. } => "withdraw",
            Op::BurnTokens { .. } => "burn_tokens",
            Op::WithdrawConfirmed { .. } => "withdraw_confirmed",
            Op::Withdrawal { .. } => "withdrawal",
            Op::RequestLoan(_) => "request_loan",
            Op::ParticipateInElection { .. } => "participate_in_election",
            Op::NewStake { .. } => "new_stake",
            Op::LoanReleased { .. } => "loan_released",
            Op::ReportOutcomes { .. } => "report_outcomes",
            Op::SettleRound { .. } => "settle_round",
            Op::LoanSettled { .. } => "loan_settled",
            Op::ProposeGovernor { .. } => "propose_governor",
            Op::AcceptGovernance => "accept_governance",
            Op::SetHalter { .. } => "set_halter",
            Op::SetDriver { .. } => "set_driver",
            Op::SetContent { .. } => "set_content",
            Op::SetStopped { .. } => "set_stopped",
            Op::SetRewardShare { .. } => "set_reward_share",
        }
    }

    /// Wire encoding of the body
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Encoded size in bytes, used to price forwarding
    pub fn encoded_len(&self) -> u64 {
        bincode::serialized_size(self).unwrap_or(0)
    }
}

/// A delivered message as seen by the receiving actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: Address,
    pub to: Address,
    /// Value credited to the recipient (forwarding fee already deducted)
    pub value: Amount,
    pub op: Op,
    /// Whether a failed handler returns the value to the sender
    pub bounce: bool,
    /// Whether this message is itself a returned bounce
    pub bounced: bool,
}

impl Message {
    pub fn new(from: Address, to: Address, value: Amount, op: Op) -> Self {
        Self { from, to, value, op, bounce: true, bounced: false }
    }

    /// Opcode as observed on the wire (`BOUNCE` for returned messages)
    pub fn opcode(&self) -> u32 {
        if self.bounced {
            opcodes::BOUNCE
        } else {
            self.op.opcode()
        }
    }
}
