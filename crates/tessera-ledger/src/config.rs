//! Ledger construction parameters.
//!
//! The fee and membership length are fixed when the ledger is built and
//! never change afterwards. Both must be positive.

use serde::{Deserialize, Serialize};
use tessera_types::{Amount, Tick};

use crate::{LedgerError, Result};

/// Default membership fee in the smallest value unit.
pub const DEFAULT_FEE: Amount = 100_000;

/// Default membership length in ticks.
pub const DEFAULT_MEMBERSHIP_LENGTH: Tick = 10;

/// Fee and period length for one ledger instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Fee charged per membership period.
    pub fee: Amount,
    /// Period length in ticks.
    pub membership_length: Tick,
}

impl LedgerConfig {
    /// Build and validate a configuration.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidConfig`] if either parameter is zero
    pub fn new(fee: Amount, membership_length: Tick) -> Result<Self> {
        let config = Self {
            fee,
            membership_length,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration from TOML.
    ///
    /// ```toml
    /// fee = 100000
    /// membership_length = 10
    /// ```
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Serialization`] if the TOML is malformed
    /// - [`LedgerError::InvalidConfig`] if either parameter is zero
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that both parameters are positive.
    pub fn validate(&self) -> Result<()> {
        if self.fee == 0 {
            return Err(LedgerError::InvalidConfig("fee must be positive".to_string()));
        }
        if self.membership_length == 0 {
            return Err(LedgerError::InvalidConfig(
                "membership_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee: DEFAULT_FEE,
            membership_length: DEFAULT_MEMBERSHIP_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = LedgerConfig::default();
        config.validate().expect("default config should be valid");
        assert_eq!(config.fee, 100_000);
        assert_eq!(config.membership_length, 10);
    }

    #[test]
    fn test_zero_fee_rejected() {
        assert!(matches!(
            LedgerConfig::new(0, 10),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(matches!(
            LedgerConfig::new(100, 0),
            Err(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_toml() {
        let config = LedgerConfig::from_toml_str("fee = 2500\nmembership_length = 30\n")
            .expect("parse toml");
        assert_eq!(config, LedgerConfig::new(2500, 30).expect("new"));
    }

    #[test]
    fn test_from_toml_rejects_zero_and_garbage() {
        assert!(matches!(
            LedgerConfig::from_toml_str("fee = 0\nmembership_length = 30\n"),
            Err(LedgerError::InvalidConfig(_))
        ));
        assert!(matches!(
            LedgerConfig::from_toml_str("fee = \"lots\""),
            Err(LedgerError::Serialization(_))
        ));
    }
}
