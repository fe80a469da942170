// treasury/src/lib.rs

//! Pooled validator-staking treasury
//!
//! This crate implements the two actors of the pool:
//! - The treasury: pool accounting, loan negotiation, round ledger
//! - Wallet shards: one per depositor, holding pool tokens
//! - Settlement arithmetic and the published reward history

pub mod times;
pub mod state;
pub mod participation;
pub mod negotiation;
pub mod settlement;
pub mod rewards;
pub mod treasury;
pub mod wallet;

pub use times::Times;
pub use state::{PoolState, TreasuryStateView, UnstakeRequest};
pub use participation::{LoanRecord, LoanState, ParticipationRecord, RoundState};
pub use negotiation::LoanNegotiator;
pub use settlement::{settle_loan, Settlement};
pub use rewards::{RewardHistory, RewardRecord, REWARD_HISTORY_LIMIT};
pub use treasury::Treasury;
pub use wallet::{wallet_address, Wallet, WalletState, WalletStatus};

use pool_core::{ActorError, Amount, Timestamp};
use pool_crypto::Address;

/// Result type for treasury operations
pub type TreasuryResult<T> = Result<T, TreasuryError>;

/// Errors that can occur in treasury operations
#[derive(Debug, thiserror::Error)]
pub enum TreasuryError {
    #[error("Treasury is stopped")]
    Paused,

    #[error("Insufficient value: required {required}, provided {provided}")]
    InsufficientValue { required: Amount, provided: Amount },

    #[error("Insufficient pool liquidity: required {required}, available {available}")]
    InsufficientPoolLiquidity { required: Amount, available: Amount },

    #[error("Invalid round {round_since}: {reason}")]
    InvalidRound { round_since: Timestamp, reason: String },

    #[error("Unauthorized: {sender} is not the {role}")]
    Unauthorized { sender: Address, role: &'static str },

    #[error("Duplicate loan for {validator} in round {round_since}")]
    DuplicateLoan { validator: Address, round_since: Timestamp },

    #[error("Insufficient tokens: requested {requested}, available {available}")]
    InsufficientTokens { requested: Amount, available: Amount },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown operation: {0:#x}")]
    UnknownOp(u32),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

impl TreasuryError {
    /// Exit code reported in the failed transaction
    pub fn exit_code(&self) -> u32 {
        match self {
            TreasuryError::Paused => 101,
            TreasuryError::InsufficientValue { .. } => 102,
            TreasuryError::InsufficientPoolLiquidity { .. } => 103,
            TreasuryError::InvalidRound { .. } => 104,
            TreasuryError::Unauthorized { .. } => 105,
            TreasuryError::DuplicateLoan { .. } => 106,
            TreasuryError::InsufficientTokens { .. } => 107,
            TreasuryError::InvalidRequest(_) => 108,
            TreasuryError::CalculationError(_) => 109,
            TreasuryError::UnknownOp(_) => 0xffff,
        }
    }

    pub(crate) fn unauthorized(sender: Address, role: &'static str) -> Self {
        TreasuryError::Unauthorized { sender, role }
    }
}

impl From<TreasuryError> for ActorError {
    fn from(err: TreasuryError) -> Self {
        ActorError::new(err.exit_code(), err.to_string())
    }
}

/// Checked subtraction reported as a calculation error
pub(crate) fn sub(a: &Amount, b: &Amount, what: &str) -> TreasuryResult<Amount> {
    a.checked_sub(b)
        .ok_or_else(|| TreasuryError::CalculationError(format!("{} underflow", what)))
}
