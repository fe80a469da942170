// treasury/src/times.rs

use pool_core::{ChainConfig, Timestamp};
use serde::{Deserialize, Serialize};

/// Round timing derived from the elected validator set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    pub current_round_since: Timestamp,
    pub next_round_since: Timestamp,
    /// Loan requests for the next round are accepted from here...
    pub participate_since: Timestamp,
    /// ...until here; stakes are forwarded after this point
    pub participate_until: Timestamp,
    /// Stakes of the next round are released after this time
    pub stake_held_until: Timestamp,
}

impl Times {
    pub fn from_config(config: &ChainConfig) -> Self {
        let next = config.validators.until;
        let e = &config.elections;
        Self {
            current_round_since: config.validators.since,
            next_round_since: next,
            participate_since: next.saturating_sub(e.start_before),
            participate_until: next.saturating_sub(e.end_before),
            stake_held_until: next + e.elected_for + e.stake_held_for,
        }
    }

    /// Whether loan requests for the next round are open at `now`
    pub fn accepts_requests(&self, now: Timestamp) -> bool {
        self.participate_since <= now && now < self.participate_until
    }

    /// Whether collected requests may be forwarded at `now`
    pub fn accepts_participation(&self, now: Timestamp) -> bool {
        self.participate_until <= now && now < self.next_round_since
    }
}
