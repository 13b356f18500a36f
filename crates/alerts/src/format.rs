//! Alert message formatting.
//!
//! Pure functions only: nothing here touches the network or the store.

use whale_core::{explorer_for, explorer_tx_url, BalanceChangeEvent, ChainId, Direction};

/// Glyph repeated once per severity level.
pub const SEVERITY_GLYPH: &str = "🐋";

/// USD lower bounds (inclusive) of severity levels 2 through 5.
const SEVERITY_TIERS: [f64; 4] = [100_000.0, 500_000.0, 1_000_000.0, 10_000_000.0];

/// Severity level from 1 to 5 for a USD value.
pub fn severity_level(value_usd: f64) -> usize {
    1 + SEVERITY_TIERS.iter().filter(|&&tier| value_usd >= tier).count()
}

/// Severity prefix, e.g. `🐋🐋🐋` for level 3.
pub fn severity_prefix(value_usd: f64) -> String {
    SEVERITY_GLYPH.repeat(severity_level(value_usd)).trim().to_string()
}

/// Glyph and verb for a direction.
pub fn direction_label(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::In => ("🟢", "received"),
        Direction::Out => ("🔴", "sent"),
    }
}

/// First 6 and last 4 characters of an address.
pub fn truncate_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Decimal exponent beyond which every f64 underflows to zero.
const MAX_F64_EXPONENT: usize = 400;

/// Scale a raw integer amount down by `decimals`.
///
/// The decimal point is shifted in the digit string before converting, so
/// 256-bit sized amounts keep their leading digits. The sign is dropped:
/// the direction already says which way the tokens moved.
pub fn scale_amount(raw: &str, decimals: u32) -> f64 {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix('-')
        .or_else(|| raw.strip_prefix('+'))
        .unwrap_or(raw);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        let value = raw.parse::<f64>().unwrap_or(0.0);
        let exponent = i32::try_from(decimals).unwrap_or(i32::MAX);
        return (value / 10f64.powi(exponent)).abs();
    }

    let decimals = decimals as usize;
    // Past f64 range the result is zero; skip building the padding.
    if decimals > digits.len() + MAX_F64_EXPONENT {
        return 0.0;
    }
    let shifted = if decimals == 0 {
        digits.to_string()
    } else if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        format!("{}.{}", int_part, frac_part)
    } else {
        format!("0.{}{}", "0".repeat(decimals - digits.len()), digits)
    };

    shifted.parse::<f64>().unwrap_or(0.0)
}

/// Format with thousands separators and at most 2 fractional digits.
///
/// Trailing fractional zeros are dropped: `1`, `1,234.5`, `0.01`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }

    let cents = (value.abs() * 100.0).round();
    let negative = value < 0.0 && cents > 0.0;
    let cents = cents.min(u128::MAX as f64) as u128;
    let int_part = cents / 100;
    let frac_part = cents % 100;

    let digits = int_part.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if frac_part != 0 {
        if frac_part % 10 == 0 {
            out.push_str(&format!(".{}", frac_part / 10));
        } else {
            out.push_str(&format!(".{:02}", frac_part));
        }
    }
    out
}

/// Format a USD amount, e.g. `$250,000`.
pub fn format_usd(value: f64) -> String {
    if value < 0.0 {
        format!("-${}", format_number(-value))
    } else {
        format!("${}", format_number(value))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a balance change as a Telegram HTML alert.
pub fn format_alert(event: &BalanceChangeEvent, chain_id: ChainId) -> String {
    let (glyph, verb) = direction_label(event.direction);
    let amount = scale_amount(&event.amount_delta, event.asset.decimals);
    let (explorer_name, _) = explorer_for(chain_id);

    format!(
        "{} {} <b>Whale Alert</b>\n\n\
         <b>{} {}</b> ({}) {} by <code>{}</code>\n\n\
         🔗 <a href=\"{}\">View on {}</a>",
        severity_prefix(event.value_delta_usd),
        glyph,
        format_number(amount),
        escape_html(&event.asset.symbol),
        format_usd(event.value_delta_usd),
        verb,
        escape_html(&truncate_address(&event.subscribed_address)),
        explorer_tx_url(chain_id, &escape_html(&event.transaction_hash)),
        explorer_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use compact_str::CompactString;
    use whale_core::AssetInfo;

    fn event(direction: Direction, usd: f64) -> BalanceChangeEvent {
        BalanceChangeEvent {
            transaction_hash: "0x1".into(),
            direction,
            amount_delta: "1000000000000000000".into(),
            value_delta_usd: usd,
            asset: AssetInfo {
                symbol: CompactString::new("FOO"),
                decimals: 18,
            },
            subscribed_address: "0xdeadbeef00000000000000000000000000000001".into(),
        }
    }

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(severity_level(0.0), 1);
        assert_eq!(severity_level(99_999.99), 1);
        assert_eq!(severity_level(100_000.0), 2);
        assert_eq!(severity_level(499_999.0), 2);
        assert_eq!(severity_level(500_000.0), 3);
        assert_eq!(severity_level(1_000_000.0), 4);
        assert_eq!(severity_level(9_999_999.0), 4);
        assert_eq!(severity_level(10_000_000.0), 5);
        assert_eq!(severity_level(1e12), 5);
    }

    #[test]
    fn test_severity_is_monotonic() {
        let mut last = 0;
        let mut value = 1.0;
        while value < 1e9 {
            let level = severity_level(value);
            assert!(level >= last);
            last = level;
            value *= 1.37;
        }
    }

    #[test]
    fn test_severity_prefix() {
        assert_eq!(severity_prefix(750_000.0), "🐋🐋🐋");
    }

    #[test]
    fn test_truncate_address() {
        assert_eq!(
            truncate_address("0xdeadbeef00000000000000000000000000000001"),
            "0xdead...0001"
        );
        assert_eq!(truncate_address("0x12345678"), "0x12345678");
        assert_eq!(truncate_address(""), "");
    }

    #[test]
    fn test_scale_amount() {
        assert_eq!(scale_amount("1000000000000000000", 18), 1.0);
        assert_eq!(scale_amount("-2500000", 6), 2.5);
        assert_eq!(scale_amount("5", 2), 0.05);
        assert_eq!(scale_amount("12345", 0), 12345.0);
        assert_eq!(scale_amount("garbage", 18), 0.0);
    }

    #[test]
    fn test_scale_amount_huge_decimals() {
        assert_eq!(scale_amount("1", u32::MAX), 0.0);
        assert_eq!(scale_amount("1.5", u32::MAX), 0.0);
        assert_eq!(scale_amount(&"9".repeat(78), 1_000_000_000), 0.0);
    }

    #[test]
    fn test_scale_amount_huge_value() {
        let raw = format!("{}{}", "123456789", "0".repeat(60));
        let scaled = scale_amount(&raw, 18);
        assert!((scaled / 1.23456789e50 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(250_000.0), "250,000");
        assert_eq!(format_number(1_234.5), "1,234.5");
        assert_eq!(format_number(1_234_567.891), "1,234,567.89");
        assert_eq!(format_number(0.004), "0");
        assert_eq!(format_number(0.01), "0.01");
        assert_eq!(format_number(999.999), "1,000");
        assert_eq!(format_number(-42.1), "-42.1");
    }

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(250_000.0), "$250,000");
        assert_eq!(format_usd(-12.5), "-$12.5");
    }

    #[test]
    fn test_format_alert_inbound() {
        let text = format_alert(&event(Direction::In, 250_000.0), ChainId(1));

        assert_eq!(text.matches(SEVERITY_GLYPH).count(), 2);
        assert!(text.contains("1 FOO"));
        assert!(text.contains("$250,000"));
        assert!(text.contains("received"));
        assert!(text.contains("0xdead...0001"));
        assert!(text.contains("https://etherscan.io/tx/0x1"));
    }

    #[test]
    fn test_format_alert_outbound_on_base() {
        let text = format_alert(&event(Direction::Out, 20_000_000.0), ChainId(8453));

        assert_eq!(text.matches(SEVERITY_GLYPH).count(), 5);
        assert!(text.contains("sent"));
        assert!(text.contains("🔴"));
        assert!(text.contains("https://basescan.org/tx/0x1"));
        assert!(text.contains("View on BaseScan"));
    }

    #[test]
    fn test_format_alert_unknown_chain_uses_etherscan() {
        let text = format_alert(&event(Direction::In, 150.0), ChainId(777));
        assert!(text.contains("https://etherscan.io/tx/0x1"));
    }

    #[test]
    fn test_format_alert_escapes_symbol() {
        let mut e = event(Direction::In, 150.0);
        e.asset.symbol = CompactString::new("<b>");
        let text = format_alert(&e, ChainId(1));
        assert!(text.contains("&lt;b&gt;"));
    }
}
