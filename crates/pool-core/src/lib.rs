// pool-core/src/lib.rs

//! Core data structures shared by every actor of the staking pool
//!
//! This crate provides:
//! - Coin amounts and share fractions
//! - The closed set of protocol messages (opcodes and payloads)
//! - Chain configuration (fees, election timing, punishment schedule)
//! - The fee model used to size every outgoing value
//! - The `Actor` trait and the per-message execution `Context`

pub mod types;
pub mod message;
pub mod config;
pub mod fees;
pub mod actor;

pub use types::*;
pub use message::{opcodes, LoanOutcome, LoanRequest, Message, Op, RoundResult};
pub use config::{ChainConfig, ElectionConfig, PunishmentConfig, ValidatorSetTiming};
pub use fees::{FeeConfig, FeeModel, Fees, GasSchedule};
pub use actor::{Actor, ActorError, ActorKind, ActorResult, Context, OutMessage};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(#[from] pool_crypto::CryptoError),
}

impl From<bincode::Error> for CoreError {
    fn from(err: bincode::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
