//! USD → NGN conversion and naira formatting.
//!
//! Every monetary value in Inveron is carried in USD (the base unit) and NGN
//! (the display unit). The rate is fixed; NGN values are always whole naira.

use std::ops::{Add, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fixed USD → NGN exchange rate.
pub const USD_TO_NGN_RATE: Decimal = dec!(1550);

const NAIRA_SIGN: char = '₦';

/// Converts a USD amount into whole naira, rounding half away from zero.
pub fn convert_usd_to_ngn(usd: Decimal) -> Decimal {
    (usd * USD_TO_NGN_RATE).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts naira back into USD. Not rounded.
pub fn convert_ngn_to_usd(ngn: Decimal) -> Decimal {
    ngn / USD_TO_NGN_RATE
}

/// Renders `₦1,550,000`. Fractions are rounded away; negatives get a leading `-`.
pub fn format_naira(ngn: Decimal) -> String {
    let whole = ngn.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = whole.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if whole.is_sign_negative() && !whole.is_zero() {
        format!("-{NAIRA_SIGN}{grouped}")
    } else {
        format!("{NAIRA_SIGN}{grouped}")
    }
}

/// Parses the output of [`format_naira`] back into a whole naira amount.
pub fn parse_naira(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix(NAIRA_SIGN)?;
    if rest.is_empty() {
        return None;
    }

    let mut groups = rest.split(',');
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 || !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits = head.to_string();
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.push_str(group);
    }

    let value: Decimal = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// A monetary value held in both denominations.
///
/// Construct through [`DualAmount::from_usd`] or [`DualAmount::from_ngn`] so the
/// two fields never drift; arithmetic applies to both fields together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DualAmount {
    pub usd: Decimal,
    pub ngn: Decimal,
}

impl DualAmount {
    pub const ZERO: DualAmount = DualAmount {
        usd: Decimal::ZERO,
        ngn: Decimal::ZERO,
    };

    pub fn from_usd(usd: Decimal) -> Self {
        Self {
            usd,
            ngn: convert_usd_to_ngn(usd),
        }
    }

    pub fn from_ngn(ngn: Decimal) -> Self {
        Self {
            usd: convert_ngn_to_usd(ngn),
            ngn,
        }
    }

    pub fn formatted(&self) -> String {
        format_naira(self.ngn)
    }
}

impl Add for DualAmount {
    type Output = DualAmount;

    fn add(self, rhs: DualAmount) -> DualAmount {
        DualAmount {
            usd: self.usd + rhs.usd,
            ngn: self.ngn + rhs.ngn,
        }
    }
}

impl Sub for DualAmount {
    type Output = DualAmount;

    fn sub(self, rhs: DualAmount) -> DualAmount {
        DualAmount {
            usd: self.usd - rhs.usd,
            ngn: self.ngn - rhs.ngn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_whole_dollars() {
        assert_eq!(convert_usd_to_ngn(dec!(100)), dec!(155000));
        assert_eq!(convert_usd_to_ngn(dec!(1000)), dec!(1550000));
    }

    #[test]
    fn test_convert_rounds_to_whole_naira() {
        // 0.0005 * 1550 = 0.775
        assert_eq!(convert_usd_to_ngn(dec!(0.0005)), dec!(1));
        // 0.01 * 1550 = 15.5
        assert_eq!(convert_usd_to_ngn(dec!(0.01)), dec!(16));
        assert_eq!(convert_usd_to_ngn(dec!(0.0001)), dec!(0));
    }

    #[test]
    fn test_convert_ngn_to_usd_inverts_whole_rate_multiples() {
        assert_eq!(convert_ngn_to_usd(dec!(1550)), dec!(1));
        assert_eq!(convert_ngn_to_usd(dec!(7750000)), dec!(5000));
    }

    #[test]
    fn test_format_groups_thousands() {
        assert_eq!(format_naira(dec!(0)), "₦0");
        assert_eq!(format_naira(dec!(999)), "₦999");
        assert_eq!(format_naira(dec!(1550)), "₦1,550");
        assert_eq!(format_naira(dec!(155000)), "₦155,000");
        assert_eq!(format_naira(dec!(7750000)), "₦7,750,000");
    }

    #[test]
    fn test_format_has_no_fraction_digits() {
        assert_eq!(format_naira(dec!(1549.6)), "₦1,550");
        assert_eq!(format_naira(dec!(1549.4)), "₦1,549");
    }

    #[test]
    fn test_format_negative() {
        assert_eq!(format_naira(dec!(-1550)), "-₦1,550");
    }

    #[test]
    fn test_parse_inverts_format_for_plan_prices() {
        for usd in [dec!(5), dec!(10), dec!(100), dec!(500), dec!(1000), dec!(5000)] {
            let ngn = convert_usd_to_ngn(usd);
            assert_eq!(parse_naira(&format_naira(ngn)), Some(ngn));
        }
        assert_eq!(parse_naira("-₦1,550"), Some(dec!(-1550)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_naira("1,550"), None);
        assert_eq!(parse_naira("₦"), None);
        assert_eq!(parse_naira("₦1,55"), None);
        assert_eq!(parse_naira("₦1550,000"), None);
        assert_eq!(parse_naira("₦1.5"), None);
    }

    #[test]
    fn test_dual_amount_arithmetic_keeps_pair_together() {
        let balance = DualAmount::from_usd(dec!(1000)) + DualAmount::from_usd(dec!(20));
        assert_eq!(balance.usd, dec!(1020));
        assert_eq!(balance.ngn, dec!(1581000));

        let after = balance - DualAmount::from_ngn(dec!(31000));
        assert_eq!(after.usd, dec!(1000));
        assert_eq!(after.ngn, dec!(1550000));
    }
}
