//! Chain and asset identifiers
//!
//! An asset is written `CHAIN.SYMBOL` (e.g. `BNB.TCAN-014`). The ticker is the
//! part of the symbol before the first `-`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SettlementError, SettlementResult};

/// Chain the engine is connected to; bare symbols resolve against it
pub const DEFAULT_CHAIN: &str = "BNB";

// ============================================
// CHAIN
// ============================================

/// Upper-cased chain identifier, 3 to 10 ASCII letters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chain(String);

impl Chain {
    pub fn new(raw: &str) -> SettlementResult<Self> {
        let raw = raw.trim();
        if !(3..=10).contains(&raw.len()) || !raw.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(SettlementError::validation(format!("chain {:?} is invalid", raw)));
        }
        Ok(Chain(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Chain {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::new(s)
    }
}

impl TryFrom<String> for Chain {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Chain::new(&value)
    }
}

impl From<Chain> for String {
    fn from(chain: Chain) -> String {
        chain.0
    }
}

// ============================================
// ASSET
// ============================================

/// A tradable asset on a specific chain
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "AssetRepr", into = "String")]
pub struct Asset {
    pub chain: Chain,
    pub symbol: String,
    pub ticker: String,
}

impl Asset {
    /// Parse `CHAIN.SYMBOL`, or a bare `SYMBOL` on `default_chain`
    pub fn parse_on(raw: &str, default_chain: &Chain) -> SettlementResult<Self> {
        let raw = raw.trim();
        let (chain, symbol) = match raw.split_once('.') {
            Some((chain, symbol)) => (Chain::new(chain)?, symbol),
            None => (default_chain.clone(), raw),
        };

        if symbol.is_empty()
            || !symbol
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            || symbol.starts_with('-')
        {
            return Err(SettlementError::validation(format!("asset {:?} is invalid", raw)));
        }

        let symbol = symbol.to_ascii_uppercase();
        let ticker = symbol.split('-').next().unwrap_or_default().to_string();
        Ok(Asset { chain, symbol, ticker })
    }

    pub fn is_gas_asset(&self) -> bool {
        self.symbol == self.chain.as_str()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.chain, self.symbol)
    }
}

impl FromStr for Asset {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Asset::parse_on(s, &Chain(DEFAULT_CHAIN.to_string()))
    }
}

/// Wire forms accepted for an asset: `"BNB.TCAN-014"` or
/// `{"chain": "BNB", "symbol": "TCAN-014", "ticker": "TCAN"}`
#[derive(Deserialize)]
#[serde(untagged)]
enum AssetRepr {
    Text(String),
    Parts {
        chain: String,
        symbol: String,
        #[serde(default)]
        #[allow(dead_code)]
        ticker: Option<String>,
    },
}

impl TryFrom<AssetRepr> for Asset {
    type Error = SettlementError;

    fn try_from(value: AssetRepr) -> Result<Self, Self::Error> {
        match value {
            AssetRepr::Text(text) => text.parse(),
            AssetRepr::Parts { chain, symbol, .. } => Asset::parse_on(&symbol, &Chain::new(&chain)?),
        }
    }
}

impl From<Asset> for String {
    fn from(asset: Asset) -> String {
        asset.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_asset() {
        let asset: Asset = "bnb.tcan-014".parse().unwrap();
        assert_eq!(asset.chain.as_str(), "BNB");
        assert_eq!(asset.symbol, "TCAN-014");
        assert_eq!(asset.ticker, "TCAN");
        assert_eq!(asset.to_string(), "BNB.TCAN-014");
    }

    #[test]
    fn test_bare_symbol_uses_default_chain() {
        let btc = Chain::new("BTC").unwrap();
        let asset = Asset::parse_on("BTC", &btc).unwrap();
        assert_eq!(asset.to_string(), "BTC.BTC");
        assert!(asset.is_gas_asset());

        let rune: Asset = "RUNE-B1A".parse().unwrap();
        assert_eq!(rune.to_string(), "BNB.RUNE-B1A");
        assert!(!rune.is_gas_asset());
    }

    #[test]
    fn test_structural_equality() {
        let a: Asset = "BNB.TCAN-014".parse().unwrap();
        let b: Asset = "tcan-014".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reject_malformed_assets() {
        assert!("".parse::<Asset>().is_err());
        assert!("BNB.".parse::<Asset>().is_err());
        assert!("B.TCAN".parse::<Asset>().is_err());
        assert!("BNB.TC AN".parse::<Asset>().is_err());
        assert!("BNB.-TCAN".parse::<Asset>().is_err());
        assert!("B1B.TCAN".parse::<Asset>().is_err());
    }

    #[test]
    fn test_asset_serde_as_string() {
        let asset: Asset = "BNB.BNB".parse().unwrap();
        let json = serde_json::to_string(&asset).unwrap();
        assert_eq!(json, "\"BNB.BNB\"");
        let back: Asset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, asset);

        let parts: Asset =
            serde_json::from_str(r#"{"chain": "BNB", "symbol": "TCAN-014", "ticker": "TCAN"}"#).unwrap();
        assert_eq!(parts.to_string(), "BNB.TCAN-014");
        assert!(serde_json::from_str::<Asset>(r#"{"chain": "B", "symbol": "X"}"#).is_err());
    }
}
