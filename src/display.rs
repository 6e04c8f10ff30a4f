//! Number formatting for terminal output.

use rust_decimal::Decimal;

use crate::aggregate::round_cents;

/// Insert `,` between groups of three digits in an unsigned digit string.
fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// `1234567` → `1,234,567`.
pub fn format_count(n: usize) -> String {
    group_digits(&n.to_string())
}

/// Money with two decimals and grouped thousands: `12,345.60`.
pub fn format_amount(value: Decimal) -> String {
    let fixed = format!("{:.2}", round_cents(value.abs()));
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < Decimal::ZERO { "-" } else { "" };
    format!("{}{}.{}", sign, group_digits(whole), frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn amounts() {
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
        assert_eq!(format_amount(Decimal::new(9995, 1)), "999.50");
        assert_eq!(format_amount(Decimal::new(123456, 1)), "12,345.60");
        assert_eq!(format_amount(Decimal::new(1_000_000, 0)), "1,000,000.00");
        assert_eq!(format_amount(Decimal::new(1005, 3)), "1.01");
        assert_eq!(format_amount(Decimal::new(-25, 1)), "-2.50");
    }
}
