use alloy::primitives::U256;
use eyre::Context as _;

/// Parse a decimal UI amount (e.g. `"0.05"` ether) into base units without floats.
pub fn parse_amount_ui_to_base_u128(s: &str, decimals: u32) -> eyre::Result<u128> {
    let s = s.trim();
    if s.is_empty() {
        eyre::bail!("empty amount");
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.starts_with('-') {
        eyre::bail!("amount must be non-negative");
    }
    if whole.is_empty() && frac.is_empty() {
        eyre::bail!("invalid amount: {s}");
    }

    let whole_v: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().context("parse whole")?
    };

    if frac.len() > decimals as usize {
        eyre::bail!("too many decimal places (decimals={decimals})");
    }
    let frac_v: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        padded.parse().context("parse fractional")?
    };

    let scale = 10_u128
        .checked_pow(decimals)
        .ok_or_else(|| eyre::eyre!("decimals too large"))?;
    whole_v
        .checked_mul(scale)
        .and_then(|x| x.checked_add(frac_v))
        .ok_or_else(|| eyre::eyre!("amount overflow"))
}

/// Format a base-unit amount as a trimmed decimal string.
///
/// - base=1500000, decimals=6 => "1.5"
/// - base=1, decimals=6 => "0.000001"
pub fn format_amount_base_to_ui_string(base: u128, decimals: u32) -> eyre::Result<String> {
    if decimals == 0 {
        return Ok(base.to_string());
    }
    let scale = 10_u128
        .checked_pow(decimals)
        .ok_or_else(|| eyre::eyre!("decimals too large"))?;
    let whole = base / scale;
    let frac = base % scale;
    if frac == 0 {
        return Ok(whole.to_string());
    }
    let frac_s = format!("{frac:0width$}", width = decimals as usize);
    Ok(format!("{whole}.{}", frac_s.trim_end_matches('0')))
}

/// [`format_amount_base_to_ui_string`] for on-chain `uint256` values.
pub fn format_u256(base: U256, decimals: u32) -> eyre::Result<String> {
    if base > U256::from(u128::MAX) {
        eyre::bail!("amount exceeds u128");
    }
    format_amount_base_to_ui_string(base.to::<u128>(), decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ether_strings_become_wei() -> eyre::Result<()> {
        assert_eq!(parse_amount_ui_to_base_u128("0", 18)?, 0);
        assert_eq!(parse_amount_ui_to_base_u128("1", 18)?, 1_000_000_000_000_000_000);
        assert_eq!(parse_amount_ui_to_base_u128("0.05", 18)?, 50_000_000_000_000_000);
        assert_eq!(parse_amount_ui_to_base_u128(".5", 6)?, 500_000);
        Ok(())
    }

    #[test]
    fn malformed_amounts_are_rejected() {
        for bad in ["", " ", "-1", ".", "1.2.3", "abc", "1.0000001"] {
            assert!(
                parse_amount_ui_to_base_u128(bad, 6).is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn formats_trim_trailing_zeros() -> eyre::Result<()> {
        assert_eq!(format_amount_base_to_ui_string(1_500_000, 6)?, "1.5");
        assert_eq!(format_amount_base_to_ui_string(1, 6)?, "0.000001");
        assert_eq!(format_amount_base_to_ui_string(10_000_000, 6)?, "10");
        assert_eq!(format_u256(U256::from(25_000_000_000_u64), 9)?, "25");
        Ok(())
    }
}
