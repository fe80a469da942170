// pool-core/src/config.rs

use crate::{fees::{FeeConfig, FeeModel, GasSchedule}, types::*, CoreError, CoreResult};
use pool_crypto::{Address, ContractKind};
use serde::{Deserialize, Serialize};

/// Election timing parameters (seconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Length of one validation round
    pub elected_for: u64,
    /// Elections for the next round open this long before it starts
    pub start_before: u64,
    /// Elections close this long before the next round starts
    pub end_before: u64,
    /// Stakes stay frozen this long after their round ends
    pub stake_held_for: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            elected_for: 65_536,
            start_before: 32_768,
            end_before: 8_192,
            stake_held_for: 32_768,
        }
    }
}

/// Boundaries of the currently elected validator set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSetTiming {
    pub since: Timestamp,
    pub until: Timestamp,
}

impl Default for ValidatorSetTiming {
    fn default() -> Self {
        Self { since: 0, until: 65_536 }
    }
}

impl ValidatorSetTiming {
    /// Set in office at `now`; sets change every `elected_for` seconds
    pub fn at(now: Timestamp, elected_for: u64) -> Self {
        let since = now - now % elected_for.max(1);
        Self { since, until: since + elected_for }
    }
}

/// Punishment schedule applied to misbehaving validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentConfig {
    /// Fixed fine
    pub flat_fine: Amount,
    /// Fine proportional to the stake, in units of 2^-32
    pub proportional_fine: u32,
}

impl Default for PunishmentConfig {
    fn default() -> Self {
        Self {
            flat_fine: Amount::from_coins(101),
            proportional_fine: 0,
        }
    }
}

impl PunishmentConfig {
    /// Largest punishment the schedule can impose on `stake`
    pub fn max_punishment(&self, stake: &Amount) -> Amount {
        let proportional = stake.mul_ratio(self.proportional_fine as u64, 1u64 << 32)
            .unwrap_or_else(Amount::zero);
        self.flat_fine.clone() + proportional
    }
}

/// Chain-level parameters visible to every actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub elections: ElectionConfig,
    pub validators: ValidatorSetTiming,
    pub punishment: PunishmentConfig,
    pub fees: FeeConfig,
    pub gas: GasSchedule,
    /// Address of the consensus layer (receives stakes, reports outcomes)
    pub elector: Address,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainConfig {
    /// Production parameters
    pub fn mainnet() -> Self {
        Self {
            elections: ElectionConfig::default(),
            validators: ValidatorSetTiming::default(),
            punishment: PunishmentConfig::default(),
            fees: FeeConfig::default(),
            gas: GasSchedule::default(),
            elector: Self::default_elector(),
        }
    }

    /// Short rounds for local runs and tests
    pub fn test() -> Self {
        Self {
            elections: ElectionConfig {
                elected_for: 1_024,
                start_before: 512,
                end_before: 128,
                stake_held_for: 256,
            },
            validators: ValidatorSetTiming { since: 0, until: 1_024 },
            ..Self::mainnet()
        }
    }

    pub fn default_elector() -> Address {
        Address::derive(ContractKind::Consensus, &Address::zero(), &[])
    }

    pub fn fee_model(&self) -> FeeModel {
        FeeModel::new(self.fees.clone(), self.gas.clone())
    }

    /// Check timing consistency
    pub fn validate(&self) -> CoreResult<()> {
        let e = &self.elections;
        if e.elected_for == 0 {
            return Err(CoreError::InvalidConfiguration("elected_for must be positive".into()));
        }
        if e.end_before >= e.start_before {
            return Err(CoreError::InvalidConfiguration(
                "end_before must be smaller than start_before".into(),
            ));
        }
        if self.validators.until <= self.validators.since {
            return Err(CoreError::InvalidConfiguration(
                "validator set must end after it starts".into(),
            ));
        }
        if self.validators.until < e.start_before {
            return Err(CoreError::InvalidConfiguration(
                "validator set ends before elections could open".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ChainConfig::default().validate().is_ok());
        assert!(ChainConfig::test().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_election_window() {
        let mut config = ChainConfig::test();
        config.elections.end_before = config.elections.start_before;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_punishment() {
        let mut punishment = PunishmentConfig::default();
        let stake = Amount::from_coins(300_000);
        assert_eq!(punishment.max_punishment(&stake), Amount::from_coins(101));

        // Half of the stake
        punishment.proportional_fine = 1 << 31;
        assert_eq!(punishment.max_punishment(&stake), Amount::from_coins(150_101));
    }

    #[test]
    fn test_validator_set_at() {
        let timing = ValidatorSetTiming::at(2_500, 1_024);
        assert_eq!(timing.since, 2_048);
        assert_eq!(timing.until, 3_072);
        assert_eq!(ValidatorSetTiming::at(2_048, 1_024), timing);
    }
}
