// treasury/src/rewards.rs

use crate::participation::ParticipationRecord;
use pool_core::{Amount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of published rounds kept in the history
pub const REWARD_HISTORY_LIMIT: usize = 32;

/// Published result of a finished round (immutable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub round_since: Timestamp,
    pub profit: Amount,
    pub loss: Amount,
    /// Pool totals when the round's stakes were forwarded
    pub total_coins: Amount,
    pub total_tokens: Amount,
    pub published_at: Timestamp,
}

impl RewardRecord {
    pub fn from_participation(record: &ParticipationRecord, published_at: Timestamp) -> Self {
        Self {
            round_since: record.round_since,
            profit: record.profit.clone(),
            loss: record.loss.clone(),
            total_coins: record.snapshot_coins.clone(),
            total_tokens: record.snapshot_tokens.clone(),
            published_at,
        }
    }

    /// Profit attributable to `tokens` held at the snapshot
    pub fn share_for(&self, tokens: &Amount) -> Amount {
        self.profit
            .mul_div(tokens, &self.total_tokens)
            .unwrap_or_else(Amount::zero)
    }
}

/// Bounded history of published rounds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardHistory {
    records: BTreeMap<Timestamp, RewardRecord>,
}

impl RewardHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a record, pruning the oldest rounds past the limit.
    /// An already published round is never overwritten.
    pub fn publish(&mut self, record: RewardRecord) -> bool {
        if self.records.contains_key(&record.round_since) {
            return false;
        }
        self.records.insert(record.round_since, record);
        while self.records.len() > REWARD_HISTORY_LIMIT {
            let oldest = match self.records.keys().next() {
                Some(k) => *k,
                None => break,
            };
            self.records.remove(&oldest);
        }
        true
    }

    pub fn get(&self, round_since: Timestamp) -> Option<&RewardRecord> {
        self.records.get(&round_since)
    }

    pub fn latest(&self) -> Option<&RewardRecord> {
        self.records.values().next_back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RewardRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
