// pool-crypto/src/lib.rs

//! Hashing and addressing primitives for the staking pool
//!
//! This crate provides:
//! - 32-byte hashes (SHA256, Blake3)
//! - 20-byte actor addresses
//! - Deterministic contract address derivation (wallet shards)

pub mod hash;
pub mod address;

pub use hash::{Hash, HashAlgorithm, Hashable};
pub use address::{Address, ContractKind, ADDRESS_SIZE};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid hash")]
    InvalidHash,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_is_stable() {
        let treasury = Address::from_label("treasury");
        let owner = Address::from_label("staker");
        let first = Address::derive(ContractKind::Wallet, &treasury, &[owner.as_bytes()]);
        let second = Address::derive(ContractKind::Wallet, &treasury, &[owner.as_bytes()]);
        assert_eq!(first, second);
    }
}
