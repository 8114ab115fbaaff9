//! Memo Parser
//!
//! ```text
//! create:<ASSET>                       &
//! stake:<ASSET>                        +
//! withdraw:<ASSET>[:<BPS>]             -
//! swap:<TARGET>[:<DEST>[:<LIMIT>]]     >
//! add:<ASSET>                          %
//! gas                                  $
//! outbound:<HEIGHT>
//! endpool:<ASSET>
//! admin:key:<KEY>:<VALUE...>           !
//! admin:poolstatus:<ASSET>:<STATUS>
//! ```
//!
//! Keywords are case-insensitive. Anything after a swap limit is free text.
//! The limit is either an integer in the smallest unit or a whole-coin
//! decimal (`0.160053`). A memo that fails to parse becomes
//! `Memo::Unrecognized`, or `AdminMemo::Invalid` when it was an admin memo;
//! parsing never fails outright.

use crate::admin::AdminKey;
use crate::common::{Address, Amount, Asset, Chain};
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::PoolStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminMemo {
    Key { key: AdminKey, value: String },
    PoolStatus { asset: Asset, status: PoolStatus },
    /// Admin keyword with a body that didn't parse
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Memo {
    Create { asset: Asset },
    Stake { asset: Asset },
    Withdraw { asset: Asset, basis_points: Option<u64> },
    Swap {
        target: Asset,
        destination: Option<Address>,
        limit: Option<Amount>,
    },
    Add { asset: Asset },
    Gas,
    Outbound { height: u64 },
    EndPool { asset: Asset },
    Admin(AdminMemo),
    Unrecognized { reason: String },
}

impl Memo {
    pub fn kind(&self) -> &'static str {
        match self {
            Memo::Create { .. } => "create",
            Memo::Stake { .. } => "stake",
            Memo::Withdraw { .. } => "withdraw",
            Memo::Swap { .. } => "swap",
            Memo::Add { .. } => "add",
            Memo::Gas => "gas",
            Memo::Outbound { .. } => "outbound",
            Memo::EndPool { .. } => "endpool",
            Memo::Admin(_) => "admin",
            Memo::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Asset the command acts on, if any
    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Memo::Create { asset }
            | Memo::Stake { asset }
            | Memo::Withdraw { asset, .. }
            | Memo::Add { asset }
            | Memo::EndPool { asset } => Some(asset),
            Memo::Swap { target, .. } => Some(target),
            Memo::Admin(AdminMemo::PoolStatus { asset, .. }) => Some(asset),
            _ => None,
        }
    }
}

/// Parse a memo; bare symbols resolve against `default_chain`
pub fn parse_memo(raw: &str, default_chain: &Chain) -> Memo {
    match parse(raw, default_chain) {
        Ok(memo) => memo,
        Err(err) => Memo::Unrecognized {
            reason: err.to_string(),
        },
    }
}

fn parse(raw: &str, chain: &Chain) -> SettlementResult<Memo> {
    let parts: Vec<&str> = raw.trim().split(':').map(str::trim).collect();
    let keyword = parts.first().copied().unwrap_or_default().to_lowercase();
    let arg = |i: usize| parts.get(i).copied().filter(|s| !s.is_empty());
    let asset_at = |i: usize| -> SettlementResult<Asset> {
        let raw = arg(i).ok_or_else(|| SettlementError::validation(format!("{} memo needs an asset", keyword)))?;
        Asset::parse_on(raw, chain)
    };

    match keyword.as_str() {
        "create" | "&" => Ok(Memo::Create { asset: asset_at(1)? }),
        "stake" | "+" => Ok(Memo::Stake { asset: asset_at(1)? }),
        "withdraw" | "-" => {
            let basis_points = arg(2)
                .map(|s| {
                    s.parse::<u64>().map_err(|_| {
                        SettlementError::validation(format!("withdraw basis points {:?} is invalid", s))
                    })
                })
                .transpose()?;
            Ok(Memo::Withdraw {
                asset: asset_at(1)?,
                basis_points,
            })
        }
        "swap" | ">" => {
            let destination = arg(2).map(Address::new).transpose()?;
            let limit = arg(3)
                .map(Amount::from_decimal)
                .transpose()?
                .filter(|l| !l.is_zero());
            Ok(Memo::Swap {
                target: asset_at(1)?,
                destination,
                limit,
            })
        }
        "add" | "%" => Ok(Memo::Add { asset: asset_at(1)? }),
        "gas" | "$" => Ok(Memo::Gas),
        "outbound" => {
            let raw_height = arg(1).ok_or_else(|| SettlementError::validation("outbound memo needs a height"))?;
            let height = raw_height.parse::<u64>().map_err(|_| {
                SettlementError::validation(format!("outbound height {:?} is invalid", raw_height))
            })?;
            Ok(Memo::Outbound { height })
        }
        "endpool" => Ok(Memo::EndPool { asset: asset_at(1)? }),
        "admin" | "!" => Ok(parse_admin(&parts, chain).unwrap_or_else(|err| {
            Memo::Admin(AdminMemo::Invalid {
                reason: err.to_string(),
            })
        })),
        "" => Err(SettlementError::validation("memo is empty")),
        other => Err(SettlementError::validation(format!("memo keyword {:?} is unknown", other))),
    }
}

fn parse_admin(parts: &[&str], chain: &Chain) -> SettlementResult<Memo> {
    if parts.len() < 4 {
        return Err(SettlementError::validation(
            "admin memo needs a subtype, a key and a value",
        ));
    }
    let value = parts[3..].join(":");
    match parts[1].to_lowercase().as_str() {
        "key" => Ok(Memo::Admin(AdminMemo::Key {
            key: parts[2].parse()?,
            value,
        })),
        "poolstatus" => Ok(Memo::Admin(AdminMemo::PoolStatus {
            asset: Asset::parse_on(parts[2], chain)?,
            status: value.parse()?,
        })),
        other => Err(SettlementError::validation(format!("admin subtype {:?} is unknown", other))),
    }
}
