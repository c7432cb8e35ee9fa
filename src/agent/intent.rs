//! Typed intents and the literal command grammar.
//!
//! Literal commands are matched on their first word. Anything else falls
//! through to the embedded swap phrase and then to the classifier.

use std::sync::LazyLock;

use ethers::types::Address;
use regex::Regex;
use rust_decimal::Decimal;

use crate::defi::units::parse_amount;
use crate::error::CommandError;
use crate::network::{NetworkProfile, parse_address};

/// One resolved request. Every message maps to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CheckBalance,
    SendToken {
        to_address: Address,
        amount: Decimal,
    },
    SwapToken {
        token_in: String,
        token_out: String,
        amount: Decimal,
    },
    CrossChainSwap {
        amount: Decimal,
    },
    StakeNative {
        amount: Decimal,
    },
    AddLiquidity {
        token_a: String,
        token_b: String,
        amount_a: Decimal,
    },
    AddLiquidityNative {
        token: String,
        amount_native: Decimal,
    },
    RiskAssessment {
        score: u8,
    },
    RequestAttestation,
    Help,
    Conversational,
}

impl Intent {
    /// Stable label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CheckBalance => "balance",
            Self::SendToken { .. } => "send",
            Self::SwapToken { .. } => "swap",
            Self::CrossChainSwap { .. } => "cross_chain_swap",
            Self::StakeNative { .. } => "stake",
            Self::AddLiquidity { .. } => "pool_add",
            Self::AddLiquidityNative { .. } => "pool_add_native",
            Self::RiskAssessment { .. } => "risk",
            Self::RequestAttestation => "attest",
            Self::Help => "help",
            Self::Conversational => "conversational",
        }
    }
}

/// Outcome of matching a message against the literal grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralCommand {
    Intent(Intent),
    /// `confirm`: release the wallet's pending plan.
    Confirm,
    /// Recognized but unsupported; reply with the fixed text.
    Rejected(&'static str),
    /// `send` whose arguments need the classifier's extraction.
    ExtractSend,
}

pub const PERP_REJECTION: &str =
    "Perpetuals trading is not supported. Use swap for BlazeSwap token trades.";

/// Words that start a literal command.
pub const COMMAND_WORDS: &[&str] = &[
    "attest",
    "balance",
    "check",
    "confirm",
    "help",
    "perp",
    "pool",
    "risk",
    "send",
    "stake",
    "swap",
    "universal",
];

static EMBEDDED_SWAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bswap\s+(\d+(?:\.\d+)?)\s+([\w.]+)\s+to\s+([\w.]+)")
        .expect("embedded swap pattern is a valid regex")
});

pub fn swap_usage(symbols: &str) -> String {
    format!(
        "Usage: swap <amount> <token_in> to <token_out>\n\
         Example: swap 0.1 FLR to USDC.E\n\
         Example: swap 0.1 FLR to FLX\n\n\
         Supported tokens: {symbols}"
    )
}

pub fn universal_usage(symbols: &str) -> String {
    format!(
        "Usage: universal <amount> <token_in> <token_out>\n\
         Example: universal 0.1 FLR USDC.E\n\
         Universal swaps are routed through BlazeSwap, same as swap.\n\n\
         Supported tokens: {symbols}"
    )
}

pub fn pool_usage(native: &str, symbols: &str) -> String {
    format!(
        "Usage: pool add <amount> <token_a> <token_b>\n\
         Example: pool add 1 W{native} USDC.E\n\
         Example: pool add 100 FLX USDC.E\n\n\
         Or for native {native}:\n\
         pool add <amount_{native_lower}> {native} <token>\n\
         Example: pool add 1 {native} USDC.E\n\n\
         Supported tokens: {symbols}",
        native_lower = native.to_ascii_lowercase()
    )
}

pub fn stake_usage(native: &str) -> String {
    format!("Usage: stake <amount> {native}\nExample: stake 10 {native}")
}

pub fn risk_usage() -> String {
    "Usage: risk <score>\nScore is a whole number from 1 (conservative) to 10 (aggressive).\nExample: risk 5"
        .to_string()
}

/// Match the literal grammar. `None` means the first word is not a
/// command word and resolution should continue.
pub fn parse_literal(
    message: &str,
    network: &NetworkProfile,
    symbols: &str,
) -> Option<Result<LiteralCommand, CommandError>> {
    let parts: Vec<&str> = message.split_whitespace().collect();
    let command = parts.first().map(|s| s.to_lowercase())?;

    let parsed = match command.as_str() {
        "swap" => parse_swap_args(&parts[1..], symbols).map(LiteralCommand::Intent),
        "universal" => parse_universal(&parts[1..], symbols).map(LiteralCommand::Intent),
        "balance" | "check" => Ok(LiteralCommand::Intent(Intent::CheckBalance)),
        "send" => Ok(parse_send_args(&parts[1..])
            .map(LiteralCommand::Intent)
            .unwrap_or(LiteralCommand::ExtractSend)),
        "stake" => parse_stake(message, network).map(LiteralCommand::Intent),
        "pool" => parse_pool(&parts[1..], network, symbols).map(LiteralCommand::Intent),
        "risk" => parse_risk(&parts[1..]).map(LiteralCommand::Intent),
        "attest" => Ok(LiteralCommand::Intent(Intent::RequestAttestation)),
        "help" => Ok(LiteralCommand::Intent(Intent::Help)),
        "perp" => Ok(LiteralCommand::Rejected(PERP_REJECTION)),
        "confirm" => Ok(LiteralCommand::Confirm),
        _ => return None,
    };
    Some(parsed)
}

/// `<amount> <token_in> to <token_out> [...]`
fn parse_swap_args(args: &[&str], symbols: &str) -> Result<Intent, CommandError> {
    let [amount, token_in, to, token_out, ..] = args else {
        return Err(CommandError::validation(swap_usage(symbols)));
    };
    if !to.eq_ignore_ascii_case("to") {
        return Err(CommandError::validation(swap_usage(symbols)));
    }
    Ok(Intent::SwapToken {
        token_in: token_in.to_uppercase(),
        token_out: token_out.to_uppercase(),
        amount: parse_amount(amount)?,
    })
}

/// `universal <amount> <in> <out>` is the swap phrase without `to`.
fn parse_universal(args: &[&str], symbols: &str) -> Result<Intent, CommandError> {
    let [amount, token_in, token_out] = args else {
        return Err(CommandError::validation(universal_usage(symbols)));
    };
    let rewritten = format!("swap {amount} {token_in} to {token_out}");
    tracing::debug!(rewritten = %rewritten, "Rewrote universal command");
    let rewritten_parts: Vec<&str> = rewritten.split_whitespace().collect();
    parse_swap_args(&rewritten_parts[1..], symbols)
}

/// `<amount> <address>`; `None` lets the classifier extract the fields.
fn parse_send_args(args: &[&str]) -> Option<Intent> {
    let [amount, address] = args else {
        return None;
    };
    let amount = parse_amount(amount).ok()?;
    let to_address = parse_address(address).ok()?;
    Some(Intent::SendToken { to_address, amount })
}

/// Scan for `stake <amount> <native>` anywhere in the message. The unit
/// may be the native symbol or its spelled-out name.
pub fn parse_stake(message: &str, network: &NetworkProfile) -> Result<Intent, CommandError> {
    let words: Vec<String> = message
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let native = network.native_symbol.to_lowercase();

    for window in words.windows(3) {
        let [verb, amount, unit] = window else {
            continue;
        };
        if verb != "stake" {
            continue;
        }
        let Ok(amount) = parse_amount(amount) else {
            continue;
        };
        if *unit == native || unit == network.native_long_name {
            return Ok(Intent::StakeNative { amount });
        }
    }

    Err(CommandError::parse(
        "the staking amount",
        stake_usage(network.native_symbol),
    ))
}

/// `add <amount> <token_a> <token_b>`. A native first leg selects the
/// native-paired form.
fn parse_pool(
    args: &[&str],
    network: &NetworkProfile,
    symbols: &str,
) -> Result<Intent, CommandError> {
    let usage = || CommandError::validation(pool_usage(network.native_symbol, symbols));
    let [action, amount, token_a, token_b, ..] = args else {
        return Err(usage());
    };
    if !action.eq_ignore_ascii_case("add") {
        return Err(usage());
    }
    let amount = parse_amount(amount)?;
    let token_a = token_a.to_uppercase();
    let token_b = token_b.to_uppercase();

    if token_a == network.native_symbol {
        return Ok(Intent::AddLiquidityNative {
            token: token_b,
            amount_native: amount,
        });
    }
    Ok(Intent::AddLiquidity {
        token_a,
        token_b,
        amount_a: amount,
    })
}

fn parse_risk(args: &[&str]) -> Result<Intent, CommandError> {
    let Some(raw) = args.first() else {
        return Err(CommandError::validation(risk_usage()));
    };
    match raw.parse::<u8>() {
        Ok(score) if (1..=10).contains(&score) => Ok(Intent::RiskAssessment { score }),
        _ => Err(CommandError::validation(format!(
            "Invalid risk score: {raw}. {}",
            risk_usage()
        ))),
    }
}

/// Find a swap phrase anywhere in the message.
pub fn find_embedded_swap(message: &str) -> Option<Result<Intent, CommandError>> {
    let captures = EMBEDDED_SWAP.captures(message)?;
    let amount = captures.get(1)?.as_str();
    let token_in = captures.get(2)?.as_str();
    let token_out = captures.get(3)?.as_str();
    Some(parse_amount(amount).map(|amount| Intent::SwapToken {
        token_in: token_in.to_uppercase(),
        token_out: token_out.to_uppercase(),
        amount,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkId, NetworkRegistry};
    use rust_decimal_macros::dec;

    const SYMBOLS: &str = "FLR, WFLR, USDC.E, USDT, WETH, FLX";

    fn flare() -> NetworkProfile {
        NetworkRegistry::builtin()
            .unwrap()
            .profile(NetworkId::Flare)
            .unwrap()
            .clone()
    }

    fn literal(message: &str) -> Result<LiteralCommand, CommandError> {
        parse_literal(message, &flare(), SYMBOLS).expect("literal command")
    }

    #[test]
    fn swap_with_trailing_words_is_literal() {
        match literal("swap 1 FLR to USDC.E please").unwrap() {
            LiteralCommand::Intent(Intent::SwapToken {
                token_in,
                token_out,
                amount,
            }) => {
                assert_eq!(token_in, "FLR");
                assert_eq!(token_out, "USDC.E");
                assert_eq!(amount, dec!(1));
            }
            other => panic!("Expected SwapToken, got {other:?}"),
        }
    }

    #[test]
    fn short_swap_returns_usage() {
        let err = literal("swap 1 FLR").unwrap_err();
        assert!(err.to_string().starts_with("Usage: swap <amount>"));
        assert!(err.to_string().contains(SYMBOLS));
    }

    #[test]
    fn first_word_is_case_insensitive() {
        assert!(matches!(
            literal("BALANCE"),
            Ok(LiteralCommand::Intent(Intent::CheckBalance))
        ));
        assert!(matches!(
            literal("Check"),
            Ok(LiteralCommand::Intent(Intent::CheckBalance))
        ));
        assert!(matches!(literal("CONFIRM"), Ok(LiteralCommand::Confirm)));
    }

    #[test]
    fn universal_is_rewritten_to_swap() {
        assert_eq!(
            literal("universal 2 flr usdc.e").unwrap(),
            LiteralCommand::Intent(Intent::SwapToken {
                token_in: "FLR".to_string(),
                token_out: "USDC.E".to_string(),
                amount: dec!(2),
            })
        );
        assert!(literal("universal 2 flr").is_err());
    }

    #[test]
    fn perp_is_rejected() {
        assert_eq!(
            literal("perp long BTC").unwrap(),
            LiteralCommand::Rejected(PERP_REJECTION)
        );
    }

    #[test]
    fn stake_accepts_symbol_or_long_name() {
        let network = flare();
        assert_eq!(
            parse_stake("stake 10 FLR", &network).unwrap(),
            Intent::StakeNative { amount: dec!(10) }
        );
        assert_eq!(
            parse_stake("please stake 2.5 flare to sflr", &network).unwrap(),
            Intent::StakeNative { amount: dec!(2.5) }
        );
        let err = parse_stake("stake ten FLR", &network).unwrap_err();
        assert!(matches!(err, CommandError::Parse { .. }));
    }

    #[test]
    fn pool_with_native_first_leg_is_native_paired() {
        assert_eq!(
            literal("pool add 1 FLR USDC.E").unwrap(),
            LiteralCommand::Intent(Intent::AddLiquidityNative {
                token: "USDC.E".to_string(),
                amount_native: dec!(1),
            })
        );
        assert_eq!(
            literal("pool add 100 flx usdc.e").unwrap(),
            LiteralCommand::Intent(Intent::AddLiquidity {
                token_a: "FLX".to_string(),
                token_b: "USDC.E".to_string(),
                amount_a: dec!(100),
            })
        );
        let err = literal("pool remove 1 FLR USDC.E").unwrap_err();
        assert!(err.to_string().contains("pool add <amount_flr> FLR <token>"));
    }

    #[test]
    fn risk_score_must_be_in_range() {
        assert_eq!(
            literal("risk 5").unwrap(),
            LiteralCommand::Intent(Intent::RiskAssessment { score: 5 })
        );
        assert!(literal("risk 0").is_err());
        assert!(literal("risk 11").is_err());
        assert!(literal("risk").is_err());
    }

    #[test]
    fn send_falls_back_to_extraction() {
        let to = "0xe3A1b355ca63abCBC9589334B5e609583C7BAa06";
        match literal(&format!("send 1.5 {to}")).unwrap() {
            LiteralCommand::Intent(Intent::SendToken { amount, .. }) => {
                assert_eq!(amount, dec!(1.5));
            }
            other => panic!("Expected SendToken, got {other:?}"),
        }
        assert_eq!(
            literal(&format!("send 1.5 FLR to {to}")).unwrap(),
            LiteralCommand::ExtractSend
        );
    }

    #[test]
    fn unknown_first_word_is_not_literal() {
        assert!(parse_literal("hello there", &flare(), SYMBOLS).is_none());
        assert!(parse_literal("   ", &flare(), SYMBOLS).is_none());
    }

    #[test]
    fn embedded_swap_is_found_mid_sentence() {
        let intent = find_embedded_swap("could you swap 0.5 flx to flr for me")
            .unwrap()
            .unwrap();
        assert_eq!(
            intent,
            Intent::SwapToken {
                token_in: "FLX".to_string(),
                token_out: "FLR".to_string(),
                amount: dec!(0.5),
            }
        );
        assert!(find_embedded_swap("what is a swap?").is_none());
    }
}
