//! Engine Configuration
//!
//! Static settings the engine is built from: which asset settles every pool,
//! who may write admin config and confirm outbounds, and how far ahead
//! payouts are scheduled. Loaded from the environment (`.env` honoured) or a
//! TOML file.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::common::{Address, Asset, Chain};
use crate::error::SettlementResult;
use crate::ledger::MAX_WITHDRAW_BASIS_POINTS;

/// Address seeded as both the trusted admin and the initial pool address
pub const DEFAULT_TRUSTED_ADDRESS: &str = "bnb1lejrrtta9cgr49fuh7ktu3sddhe0ff7wenlpn6";

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Assets ==========
    /// Settlement asset every pool is paired against
    pub base_asset: String,

    /// Chain bare memo symbols resolve to
    pub default_chain: String,

    // ========== Authorization ==========
    /// Pool address inbound transactions must target, until rotated by admin
    pub pool_address: String,

    /// Addresses allowed to write admin config
    pub trusted_addresses: Vec<String>,

    /// Addresses allowed to confirm outbounds (besides the pool address)
    pub relayer_addresses: Vec<String>,

    // ========== Outbound ==========
    /// Blocks between scheduling a payout and the batch it lands in
    pub outbound_delay: u64,

    /// Share redeemed by a withdraw without an explicit amount
    pub default_withdraw_basis_points: u64,

    // ========== Reporting ==========
    /// Where the replay binary appends block reports
    pub report_path: String,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            base_asset: env::var("BASE_ASSET").unwrap_or(defaults.base_asset),
            default_chain: env::var("DEFAULT_CHAIN").unwrap_or(defaults.default_chain),
            pool_address: env::var("POOL_ADDRESS").unwrap_or(defaults.pool_address),
            trusted_addresses: env::var("TRUSTED_ADDRESSES")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.trusted_addresses),
            relayer_addresses: env::var("RELAYER_ADDRESSES")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            outbound_delay: env::var("OUTBOUND_DELAY")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            default_withdraw_basis_points: env::var("DEFAULT_WITHDRAW_BPS")
                .unwrap_or_else(|_| MAX_WITHDRAW_BASIS_POINTS.to_string())
                .parse()
                .unwrap_or(MAX_WITHDRAW_BASIS_POINTS),
            report_path: env::var("REPORT_PATH").unwrap_or(defaults.report_path),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    // ========== Typed accessors ==========

    pub fn default_chain(&self) -> SettlementResult<Chain> {
        Chain::new(&self.default_chain)
    }

    pub fn base_asset(&self) -> SettlementResult<Asset> {
        Asset::parse_on(&self.base_asset, &self.default_chain()?)
    }

    pub fn pool_address(&self) -> SettlementResult<Address> {
        Address::new(&self.pool_address)
    }

    pub fn trusted(&self) -> SettlementResult<Vec<Address>> {
        self.trusted_addresses.iter().map(|a| Address::new(a)).collect()
    }

    pub fn relayers(&self) -> SettlementResult<Vec<Address>> {
        self.relayer_addresses.iter().map(|a| Address::new(a)).collect()
    }

    /// Validate configuration before building an engine from it
    pub fn validate(&self) -> Result<()> {
        self.default_chain()
            .map_err(|e| eyre::eyre!("Invalid DEFAULT_CHAIN: {}", e))?;
        let base = self
            .base_asset()
            .map_err(|e| eyre::eyre!("Invalid BASE_ASSET: {}", e))?;
        if base.is_gas_asset() {
            return Err(eyre::eyre!(
                "BASE_ASSET {} is a chain gas asset; pools for it could never be created",
                base
            ));
        }
        self.pool_address()
            .map_err(|e| eyre::eyre!("Invalid POOL_ADDRESS: {}", e))?;
        if self.trusted_addresses.is_empty() {
            return Err(eyre::eyre!(
                "TRUSTED_ADDRESSES is empty - admin config could never be written"
            ));
        }
        self.trusted()
            .map_err(|e| eyre::eyre!("Invalid TRUSTED_ADDRESSES: {}", e))?;
        self.relayers()
            .map_err(|e| eyre::eyre!("Invalid RELAYER_ADDRESSES: {}", e))?;
        if self.default_withdraw_basis_points == 0
            || self.default_withdraw_basis_points > MAX_WITHDRAW_BASIS_POINTS
        {
            return Err(eyre::eyre!(
                "DEFAULT_WITHDRAW_BPS must be in 1..={} (currently {})",
                MAX_WITHDRAW_BASIS_POINTS,
                self.default_withdraw_basis_points
            ));
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║             SETTLEMENT ENGINE - CONFIGURATION              ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Base Asset:        {:^40} ║", self.base_asset);
        println!("║ Default Chain:     {:^40} ║", self.default_chain);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ AUTHORIZATION                                              ║");
        println!("║ • Pool Address:    {:^40} ║", self.pool_address);
        println!("║ • Trusted Admins:  {:^40} ║", self.trusted_addresses.len());
        println!("║ • Relayers:        {:^40} ║", self.relayer_addresses.len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ OUTBOUND                                                   ║");
        println!("║ • Delay:           {:>35} blocks ║", self.outbound_delay);
        println!("║ • Default Withdraw:{:>38} bps ║", self.default_withdraw_basis_points);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Report Log:        {:^40} ║", self.report_path);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_asset: "BNB.RUNE-B1A".to_string(),
            default_chain: "BNB".to_string(),
            pool_address: DEFAULT_TRUSTED_ADDRESS.to_string(),
            trusted_addresses: vec![DEFAULT_TRUSTED_ADDRESS.to_string()],
            relayer_addresses: vec![],
            outbound_delay: 1,
            default_withdraw_basis_points: MAX_WITHDRAW_BASIS_POINTS,
            report_path: "./logs/settlement_blocks.log".to_string(),
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_asset().unwrap().to_string(), "BNB.RUNE-B1A");
        assert_eq!(config.trusted().unwrap().len(), 1);
        assert_eq!(config.outbound_delay, 1);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.base_asset = "BNB.BNB".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trusted_addresses.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relayer_addresses = vec!["not an address".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.default_withdraw_basis_points = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let config: Config = toml::from_str("outbound_delay = 3\nbase_asset = \"BNB.RUNE-67C\"").unwrap();
        assert_eq!(config.outbound_delay, 3);
        assert_eq!(config.base_asset, "BNB.RUNE-67C");
        assert_eq!(config.default_chain, "BNB");

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.base_asset, config.base_asset);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
