// storage/src/lib.rs

//! Persistent Storage Layer
//!
//! This crate provides persistent storage using RocksDB:
//! - Actor state per kind (treasury, wallets, consensus stand-in)
//! - Account balances and kinds
//! - Transaction history indexed by logical time
//! - Sandbox snapshots and restoration
//! - Transaction pruning

pub mod db;

pub use db::{ColumnFamily, Database, DatabaseConfig, DatabaseStats, StoredAccount, StoredKind};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] sandbox::SandboxError),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<pool_core::CoreError> for StorageError {
    fn from(err: pool_core::CoreError) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// How much transaction history to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningMode {
    /// Keep every transaction
    Archive,
    /// Keep the most recent `keep_transactions`
    Pruned { keep_transactions: u64 },
}
