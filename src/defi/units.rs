//! Decimal amount <-> integer minor-unit conversion and slippage math.

use std::str::FromStr;

use ethers::types::U256;
use rust_decimal::Decimal;

use crate::error::CommandError;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Parse a user-entered amount. Must be a positive decimal.
pub fn parse_amount(raw: &str) -> Result<Decimal, CommandError> {
    let parsed = Decimal::from_str(raw.trim()).map_err(|_| {
        CommandError::validation(format!(
            "Invalid amount '{}': expected a decimal number.",
            raw.trim()
        ))
    })?;
    if parsed <= Decimal::ZERO {
        return Err(CommandError::validation("Amount must be greater than zero."));
    }
    Ok(parsed)
}

/// Exact conversion to minor units. Rejects amounts with more fractional
/// digits than the token carries.
pub fn to_minor_units(amount: Decimal, decimals: u8) -> Result<U256, CommandError> {
    if amount.is_sign_negative() {
        return Err(CommandError::validation("Amount must not be negative."));
    }
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > u32::from(decimals) {
        return Err(CommandError::validation(format!(
            "Amount {amount} supports at most {decimals} decimal places."
        )));
    }
    let mantissa = u128::try_from(amount.mantissa())
        .map_err(|_| CommandError::validation(format!("Amount {amount} is out of range.")))?;
    let factor = U256::exp10((u32::from(decimals) - scale) as usize);
    U256::from(mantissa)
        .checked_mul(factor)
        .ok_or_else(|| CommandError::validation(format!("Amount {amount} is out of range.")))
}

/// Render minor units as a plain decimal string with trailing zeros trimmed.
pub fn format_minor_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Minor units back to a `Decimal`; fails only when the value exceeds
/// `Decimal`'s 96-bit mantissa.
pub fn from_minor_units(value: U256, decimals: u8) -> Result<Decimal, CommandError> {
    let rendered = format_minor_units(value, decimals);
    Decimal::from_str(&rendered).map_err(|_| {
        CommandError::validation(format!("Amount {rendered} is too large to display exactly."))
    })
}

/// `floor(amount * (10000 - bps) / 10000)`.
pub fn apply_slippage(amount: U256, slippage_bps: u32) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(slippage_bps);
    amount.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
}

/// Add a percentage buffer to a gas estimate.
pub fn with_buffer(gas: U256, percent: u32) -> U256 {
    gas.saturating_mul(U256::from(100 + percent)) / U256::from(100u32)
}
