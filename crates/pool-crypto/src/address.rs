// pool-crypto/src/address.rs

use crate::{hash::tagged_hash, CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address size in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Kinds of contracts whose address is derived from their creator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    Treasury,
    Wallet,
    Consensus,
}

impl ContractKind {
    fn tag(&self) -> u8 {
        match self {
            ContractKind::Treasury => 0x01,
            ContractKind::Wallet => 0x02,
            ContractKind::Consensus => 0x03,
        }
    }
}

/// Actor address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive the address of a contract created by `creator`.
    ///
    /// Wallet shards use `[owner]` as seed, so any client can compute the
    /// wallet address of a depositor without asking the treasury.
    pub fn derive(kind: ContractKind, creator: &Address, seed: &[&[u8]]) -> Self {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(seed.len() + 1);
        parts.push(creator.as_bytes());
        parts.extend_from_slice(seed);

        let hash = tagged_hash(kind.tag(), &parts);
        let mut address = [0u8; ADDRESS_SIZE];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Self(address)
    }

    /// Address of a named external account (sandbox users, test fixtures)
    pub fn from_label(label: &str) -> Self {
        let hash = tagged_hash(0xff, &[label.as_bytes()]);
        let mut address = [0u8; ADDRESS_SIZE];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Self(address)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(CryptoError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; ADDRESS_SIZE])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
