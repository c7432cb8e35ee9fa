//! Static network profiles for the supported Flare chains.
//!
//! Profiles are built once at startup and shared read-only afterwards.

pub mod tokens;

use std::str::FromStr;

use ethers::types::Address;
use ethers::utils::to_checksum;

use crate::error::ConfigError;

pub use self::tokens::{TokenDescriptor, TokenLocation, TokenRegistry};

/// Networks the router can build transactions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkId {
    Flare,
    Coston2,
}

impl NetworkId {
    pub(crate) fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flare" | "mainnet" => Ok(Self::Flare),
            "coston2" | "testnet" => Ok(Self::Coston2),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'flare' or 'coston2', got '{value}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flare => "flare",
            Self::Coston2 => "coston2",
        }
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chain id, native coin and contract addresses for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub id: NetworkId,
    pub chain_id: u64,
    pub native_symbol: &'static str,
    /// Spelled-out alias accepted after `stake <amount>`.
    pub native_long_name: &'static str,
    pub wrapped_symbol: &'static str,
    pub router: Address,
    pub factory: Address,
    /// Liquid staking contract (sFLR); absent on testnets.
    pub staking: Option<Address>,
    pub explorer_url: &'static str,
    pub default_rpc_url: &'static str,
}

const BLAZESWAP_ROUTER: &str = "0xe3A1b355ca63abCBC9589334B5e609583C7BAa06";
const BLAZESWAP_FACTORY: &str = "0x440602f459D7Dd500a74528003e6A20A46d6e2A6";
const SFLR_STAKING: &str = "0x12e605bc104e93B45e1aD99F9e555f659051c2BB";

impl NetworkProfile {
    fn flare() -> Result<Self, ConfigError> {
        Ok(Self {
            id: NetworkId::Flare,
            chain_id: 14,
            native_symbol: "FLR",
            native_long_name: "flare",
            wrapped_symbol: "WFLR",
            router: builtin_address(BLAZESWAP_ROUTER)?,
            factory: builtin_address(BLAZESWAP_FACTORY)?,
            staking: Some(builtin_address(SFLR_STAKING)?),
            explorer_url: "https://flare-explorer.flare.network",
            default_rpc_url: "https://flare-api.flare.network/ext/C/rpc",
        })
    }

    fn coston2() -> Result<Self, ConfigError> {
        Ok(Self {
            id: NetworkId::Coston2,
            chain_id: 114,
            native_symbol: "C2FLR",
            native_long_name: "coston2",
            wrapped_symbol: "WC2FLR",
            router: builtin_address(BLAZESWAP_ROUTER)?,
            factory: builtin_address(BLAZESWAP_FACTORY)?,
            staking: None,
            explorer_url: "https://coston2-explorer.flare.network",
            default_rpc_url: "https://coston2-api.flare.network/ext/C/rpc",
        })
    }

    /// Explorer link for a submitted transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// All built-in network profiles.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    profiles: Vec<NetworkProfile>,
}

impl NetworkRegistry {
    pub fn builtin() -> Result<Self, ConfigError> {
        Ok(Self {
            profiles: vec![NetworkProfile::flare()?, NetworkProfile::coston2()?],
        })
    }

    pub fn profile(&self, id: NetworkId) -> Option<&NetworkProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkProfile> {
        self.profiles
            .iter()
            .find(|profile| profile.chain_id == chain_id)
    }
}

pub(crate) fn builtin_address(raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw).map_err(|e| ConfigError::ParseError(format!("address {raw}: {e}")))
}

/// Parse a user-supplied `0x` address.
///
/// All-lowercase and all-uppercase input is accepted as-is; mixed case
/// must match the EIP-55 checksum exactly.
pub fn parse_address(raw: &str) -> Result<Address, String> {
    let trimmed = raw.trim();
    let Some(hex) = trimmed.strip_prefix("0x") else {
        return Err(format!("Invalid address '{trimmed}': must start with 0x."));
    };
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!(
            "Invalid address '{trimmed}': expected 40 hexadecimal characters after 0x."
        ));
    }
    let address = Address::from_str(hex).map_err(|e| format!("Invalid address '{trimmed}': {e}"))?;

    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && checksum(&address) != trimmed {
        return Err(format!("Invalid address '{trimmed}': checksum mismatch."));
    }
    Ok(address)
}

/// EIP-55 mixed-case rendering.
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// Short `0x1234...abcd` form for logs and previews.
pub fn mask_address(address: &Address) -> String {
    let full = checksum(address);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
