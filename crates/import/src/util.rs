use chrono::NaiveDate;
use kakeibo_core::text::normalize;

/// Date formats observed across vendor exports, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%Y-%m-%d",
    "%Y.%m.%d",
    "%Y年%m月%d日",
    "%m/%d/%Y",
];

/// Parse a statement date cell. Full-width digits are folded first and any
/// trailing time-of-day token ("2025/07/04 13:05") is ignored.
pub(crate) fn parse_statement_date(cell: &str) -> Option<NaiveDate> {
    let cleaned = normalize(cell);
    let date_part = cleaned.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_and_dash_formats() {
        let expect = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
        assert_eq!(parse_statement_date("2025/07/04"), Some(expect));
        assert_eq!(parse_statement_date("2025-07-04"), Some(expect));
        assert_eq!(parse_statement_date("2025.07.04"), Some(expect));
    }

    #[test]
    fn kanji_format() {
        assert_eq!(
            parse_statement_date("2025年07月04日"),
            NaiveDate::from_ymd_opt(2025, 7, 4)
        );
    }

    #[test]
    fn fullwidth_digits_fold_before_parsing() {
        assert_eq!(
            parse_statement_date("２０２５/０７/０４"),
            NaiveDate::from_ymd_opt(2025, 7, 4)
        );
    }

    #[test]
    fn trailing_time_is_ignored() {
        assert_eq!(
            parse_statement_date("2025/07/04 13:05"),
            NaiveDate::from_ymd_opt(2025, 7, 4)
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_statement_date("ご利用明細"), None);
        assert_eq!(parse_statement_date(""), None);
    }
}
