//! Ledger configuration with validation.
//!
//! Every rate and cap the engines enforce lives here; nothing is hard-coded
//! in the engines themselves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;

/// Main ledger configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// RP to TBC conversion
    pub conversion: ConversionConfig,
    /// SP allocation rules
    pub allocation: AllocationConfig,
    /// SH issuance defaults
    pub issuance: IssuanceConfig,
    /// Earning tables for RP and SP
    pub rewards: RewardsConfig,
    /// History pagination
    pub history: HistoryConfig,
}

impl LedgerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversion.rp_per_tbc == 0 {
            return Err(ConfigError::invalid("conversion.rp_per_tbc", "cannot be 0"));
        }
        if self.conversion.max_rp_per_month % self.conversion.rp_per_tbc != 0 {
            return Err(ConfigError::invalid(
                "conversion.max_rp_per_month",
                "must be a multiple of rp_per_tbc",
            ));
        }

        if self.allocation.min_per_allocation == 0 {
            return Err(ConfigError::invalid("allocation.min_per_allocation", "cannot be 0"));
        }
        if self.allocation.min_per_allocation > self.allocation.max_per_allocation {
            return Err(ConfigError::invalid(
                "allocation.min_per_allocation",
                "cannot exceed max_per_allocation",
            ));
        }
        if self.allocation.max_active_allocations == Some(0) {
            return Err(ConfigError::invalid(
                "allocation.max_active_allocations",
                "cannot be 0; omit it for no limit",
            ));
        }

        if self.issuance.default_sh_cap_per_person == 0 {
            return Err(ConfigError::invalid("issuance.default_sh_cap_per_person", "cannot be 0"));
        }
        if self.issuance.default_global_sh_cap == 0 {
            return Err(ConfigError::invalid("issuance.default_global_sh_cap", "cannot be 0"));
        }

        if self.history.default_page_size == 0 {
            return Err(ConfigError::invalid("history.default_page_size", "cannot be 0"));
        }
        if self.history.default_page_size > self.history.max_page_size {
            return Err(ConfigError::invalid(
                "history.default_page_size",
                "cannot exceed max_page_size",
            ));
        }

        Ok(())
    }

    /// Apply environment overrides on top of this configuration.
    ///
    /// # Environment Variables
    ///
    /// - `LEDGER_RP_PER_TBC`: RP per TBC
    /// - `LEDGER_MAX_RP_PER_MONTH`: monthly RP conversion cap
    /// - `LEDGER_SP_MAX_PER_ALLOCATION`: largest single SP allocation
    /// - `LEDGER_SH_GLOBAL_CAP`: default global SH cap for new events
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_u64("LEDGER_RP_PER_TBC")? {
            self.conversion.rp_per_tbc = v;
        }
        if let Some(v) = env_u64("LEDGER_MAX_RP_PER_MONTH")? {
            self.conversion.max_rp_per_month = v;
        }
        if let Some(v) = env_u64("LEDGER_SP_MAX_PER_ALLOCATION")? {
            self.allocation.max_per_allocation = v;
        }
        if let Some(v) = env_u64("LEDGER_SH_GLOBAL_CAP")? {
            self.issuance.default_global_sh_cap = v;
        }
        Ok(self)
    }
}

fn env_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(name, &e.to_string())),
        Err(_) => Ok(None),
    }
}

/// RP to TBC conversion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// RP burned per TBC credited; also the minimum conversion unit
    pub rp_per_tbc: u64,
    /// RP a member may convert per calendar month
    pub max_rp_per_month: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            rp_per_tbc: 100,
            max_rp_per_month: 100,
        }
    }
}

impl ConversionConfig {
    /// TBC a member may receive per calendar month.
    pub fn max_tbc_per_month(&self) -> u64 {
        self.max_rp_per_month / self.rp_per_tbc.max(1)
    }
}

/// SP allocation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Smallest single allocation
    pub min_per_allocation: u64,
    /// Largest single allocation
    pub max_per_allocation: u64,
    /// Active allocations per member; `None` for no limit
    pub max_active_allocations: Option<usize>,
    /// SP granted when a member is initialized
    pub initial_grant: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            min_per_allocation: 1,
            max_per_allocation: 10,
            max_active_allocations: None,
            initial_grant: 100,
        }
    }
}

/// SH issuance defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceConfig {
    /// Per-person cap for events created without one
    pub default_sh_cap_per_person: u64,
    /// Global cap for events created without one
    pub default_global_sh_cap: u64,
    /// Whether new events require fiscal regularity unless told otherwise
    pub default_fiscal_regularity_required: bool,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            default_sh_cap_per_person: 10,
            default_global_sh_cap: 1000,
            default_fiscal_regularity_required: true,
        }
    }
}

/// Earning tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// RP per contribution event type
    pub rp_earnings: BTreeMap<String, u64>,
    /// SP per governance activity
    pub sp_weights: BTreeMap<String, u64>,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        let rp_earnings = [
            ("pr_merged_small", 25),
            ("pr_merged_medium", 50),
            ("pr_merged_large", 100),
            ("docs_contribution", 15),
            ("code_review", 10),
            ("issue_triage", 5),
            ("bug_fix", 30),
            ("monthly_dues_paid", 100),
            ("donation", 200),
        ];
        let sp_weights = [
            ("group_created", 15),
            ("proposal_rated_high", 10),
            ("proposal_highly_rated", 15),
            ("comment_posted", 2),
            ("discussion_participation", 5),
            ("meeting_attended", 5),
            ("decision_implemented", 20),
        ];
        Self {
            rp_earnings: rp_earnings
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            sp_weights: sp_weights
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// History pagination limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 100,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config file {path}: {error}")]
    Io { path: String, error: String },
    /// Configuration text is not valid TOML for `LedgerConfig`
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// A value is out of range
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
