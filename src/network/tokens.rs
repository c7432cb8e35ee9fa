//! Per-network token tables.

use ethers::types::Address;

use crate::error::{CommandError, ConfigError};
use crate::network::{NetworkId, builtin_address};

/// Where a token lives on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLocation {
    /// The chain's native coin. Has no ERC20 surface.
    Native,
    Erc20(Address),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    /// Uppercase canonical symbol.
    pub symbol: String,
    pub location: TokenLocation,
    pub decimals: u8,
}

impl TokenDescriptor {
    pub fn is_native(&self) -> bool {
        matches!(self.location, TokenLocation::Native)
    }

    pub fn address(&self) -> Option<Address> {
        match self.location {
            TokenLocation::Native => None,
            TokenLocation::Erc20(address) => Some(address),
        }
    }
}

/// Symbol table for one network, in display order.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    network: NetworkId,
    tokens: Vec<TokenDescriptor>,
    native_index: usize,
}

impl TokenRegistry {
    pub fn builtin(network: NetworkId) -> Result<Self, ConfigError> {
        let table: &[(&str, Option<&str>, u8)] = match network {
            NetworkId::Flare => &[
                ("FLR", None, 18),
                ("WFLR", Some("0x1D80c49BbBCd1C0911346656B529DF9E5c2F783d"), 18),
                ("USDC.E", Some("0xFbDa5F676cB37624f28265A144A48B0d6e87d3b6"), 6),
                ("USDT", Some("0x0B38e83B86d491735fEaa0a791F65c2B99535396"), 6),
                ("WETH", Some("0x1502FA4be69d526124D453619276FacCab275d3D"), 18),
                ("FLX", Some("0x22757fb83836e3F9F0F353126cACD3B1Dc82a387"), 18),
            ],
            NetworkId::Coston2 => &[
                ("C2FLR", None, 18),
                ("WC2FLR", Some("0xC67DCE33D7A8efA5FfEB961899C73fe01bCe9273"), 18),
                ("FLX", Some("0x22757fb83836e3F9F0F353126cACD3B1Dc82a387"), 18),
            ],
        };

        let tokens = table
            .iter()
            .map(|(symbol, address, decimals)| {
                let location = match address {
                    Some(raw) => TokenLocation::Erc20(builtin_address(raw)?),
                    None => TokenLocation::Native,
                };
                Ok(TokenDescriptor {
                    symbol: symbol.to_string(),
                    location,
                    decimals: *decimals,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::from_tokens(network, tokens)
    }

    /// Build a registry from an explicit table. Symbols must be unique and
    /// exactly one entry must be native.
    pub fn from_tokens(
        network: NetworkId,
        tokens: Vec<TokenDescriptor>,
    ) -> Result<Self, ConfigError> {
        let tokens: Vec<TokenDescriptor> = tokens
            .into_iter()
            .map(|mut token| {
                token.symbol = token.symbol.trim().to_ascii_uppercase();
                token
            })
            .collect();
        let mut seen = std::collections::HashSet::new();
        for token in &tokens {
            if !seen.insert(token.symbol.clone()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("tokens.{network}"),
                    message: format!("duplicate symbol {}", token.symbol),
                });
            }
        }
        let natives: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_native())
            .map(|(i, _)| i)
            .collect();
        let [native_index] = natives[..] else {
            return Err(ConfigError::InvalidValue {
                key: format!("tokens.{network}"),
                message: format!("expected exactly one native token, found {}", natives.len()),
            });
        };
        Ok(Self {
            network,
            tokens,
            native_index,
        })
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// Case-insensitive lookup. Unknown symbols list every supported one.
    pub fn resolve(&self, symbol: &str) -> Result<&TokenDescriptor, CommandError> {
        let wanted = symbol.trim().to_ascii_uppercase();
        self.tokens
            .iter()
            .find(|token| token.symbol == wanted)
            .ok_or_else(|| CommandError::UnsupportedToken {
                symbol: wanted,
                supported: self.supported_symbols(),
            })
    }

    pub fn supported_symbols(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn native(&self) -> &TokenDescriptor {
        &self.tokens[self.native_index]
    }
}
