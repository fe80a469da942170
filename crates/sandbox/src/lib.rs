// sandbox/src/lib.rs

//! In-process host for the pool's actors
//!
//! This crate provides:
//! - Accounts, balances and a FIFO message queue
//! - Transactions with compute and action phases, rollback and bounces
//! - Transaction matchers for scenario tests
//! - A consensus-layer stand-in that holds stakes and reports outcomes

pub mod transaction;
pub mod host;
pub mod consensus;

pub use transaction::{between, SendResult, Transaction, TxPattern};
pub use host::{AccountInfo, Sandbox, SandboxCounters, EXTERNAL_INITIAL_BALANCE};
pub use consensus::{ConsensusStub, HeldStake};

use pool_core::{Amount, CoreError};
use pool_crypto::Address;

/// Result type for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors that can occur in sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Insufficient balance on {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(Address),

    #[error("Not an external account: {0}")]
    NotExternal(Address),

    #[error("Address already in use: {0}")]
    AddressInUse(Address),

    #[error("Transaction limit exceeded: {0}")]
    TransactionLimit(usize),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}
