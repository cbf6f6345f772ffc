//! TOML configuration loader.

use std::fs;
use std::path::Path;

use crate::domain::{ConfigError, LedgerConfig};

/// Loads a [`LedgerConfig`] from TOML.
///
/// Omitted sections and fields keep their defaults. The result is validated
/// before it is returned.
///
/// # Config File Format
///
/// ```toml
/// [conversion]
/// rp_per_tbc = 100
/// max_rp_per_month = 100
///
/// [allocation]
/// min_per_allocation = 1
/// max_per_allocation = 10
/// max_active_allocations = 25
/// initial_grant = 100
///
/// [issuance]
/// default_sh_cap_per_person = 10
/// default_global_sh_cap = 1000
/// default_fiscal_regularity_required = true
///
/// [rewards.rp_earnings]
/// bug_fix = 30
///
/// [history]
/// default_page_size = 50
/// max_page_size = 100
/// ```
pub struct TomlConfigProvider;

impl TomlConfigProvider {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LedgerConfig, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<LedgerConfig, ConfigError> {
        let config: LedgerConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
