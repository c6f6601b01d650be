use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::text::normalize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

/// Parse a statement amount cell into integer yen.
///
/// Accepts the notations seen across vendor exports: full-width digits,
/// thousands separators, currency marks (¥/￥/円), accounting parentheses,
/// and the Japanese triangle negatives (▲/△). Fractional yen are rounded
/// to the nearest whole yen, matching how card exports print point
/// adjustments.
pub fn parse_yen(raw: &str) -> Result<i64, AmountError> {
    let s = normalize(raw);
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (mut negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, s[1..s.len() - 1].to_string())
    } else {
        (false, s)
    };

    let mut s = s
        .replace(['\u{00A5}', '\u{FFE5}'], "") // ¥ ￥
        .replace('円', "")
        .replace([',', ' '], "");

    if let Some(rest) = s.strip_prefix(['▲', '△']) {
        negative = true;
        s = rest.to_string();
    }

    if s.is_empty() {
        return Err(AmountError::Invalid(raw.trim().to_string()));
    }

    let mut dec =
        Decimal::from_str(&s).map_err(|_| AmountError::Invalid(raw.trim().to_string()))?;
    if negative {
        dec = -dec;
    }

    dec.round()
        .to_i64()
        .ok_or_else(|| AmountError::OutOfRange(raw.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integer() {
        assert_eq!(parse_yen("816").unwrap(), 816);
    }

    #[test]
    fn fullwidth_digits() {
        assert_eq!(parse_yen("８１６").unwrap(), 816);
    }

    #[test]
    fn thousands_separator_and_yen_mark() {
        assert_eq!(parse_yen("¥1,234").unwrap(), 1234);
        assert_eq!(parse_yen("￥12,345円").unwrap(), 12345);
    }

    #[test]
    fn signed_values() {
        assert_eq!(parse_yen("-500").unwrap(), -500);
        assert_eq!(parse_yen("+500").unwrap(), 500);
    }

    #[test]
    fn triangle_negative() {
        assert_eq!(parse_yen("▲1,234").unwrap(), -1234);
        assert_eq!(parse_yen("△98").unwrap(), -98);
    }

    #[test]
    fn accounting_parens() {
        assert_eq!(parse_yen("(2,000)").unwrap(), -2000);
    }

    #[test]
    fn fractional_yen_rounds() {
        assert_eq!(parse_yen("99.5").unwrap(), 100);
        assert_eq!(parse_yen("99.4").unwrap(), 99);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_yen(""), Err(AmountError::Empty)));
        assert!(matches!(parse_yen("  "), Err(AmountError::Empty)));
        assert!(parse_yen("n/a").is_err());
        assert!(parse_yen("¥").is_err());
    }
}
