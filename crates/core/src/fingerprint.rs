use chrono::NaiveDate;

use crate::entry::{AccountId, EntryKind};
use crate::text::fold;

/// Everything that feeds the duplicate key.
///
/// `category_label` is whatever category text was in effect when the entry
/// was built: the resolved category's name when classification succeeded, or
/// the raw label from the statement otherwise. The key is computed once and
/// stored; later category renames deliberately do not change it.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    pub date: NaiveDate,
    pub kind: EntryKind,
    pub amount: i64,
    pub category_label: &'a str,
    pub description: &'a str,
    /// Both accounts, transfers only.
    pub transfer_accounts: Option<(AccountId, AccountId)>,
    /// Import source identifier (file fingerprint), when the entry came from
    /// an import batch.
    pub source: Option<&'a str>,
}

/// Deterministic composite duplicate key. Two entries are duplicates iff
/// their fingerprints are equal. Free-text parts go through [`fold`], so
/// width and case variants of the same description collide as intended.
pub fn entry_fingerprint(input: &FingerprintInput<'_>) -> String {
    let mut parts = vec![
        input.date.format("%Y-%m-%d").to_string(),
        input.kind.as_str().to_string(),
        input.amount.to_string(),
        fold(input.category_label),
        fold(input.description),
    ];

    if input.kind == EntryKind::Transfer {
        if let Some((from, to)) = input.transfer_accounts {
            parts.push(from.to_string());
            parts.push(to.to_string());
        }
    }

    if let Some(source) = input.source {
        parts.push(source.to_string());
    }

    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base<'a>(description: &'a str, category: &'a str) -> FingerprintInput<'a> {
        FingerprintInput {
            date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            kind: EntryKind::Expense,
            amount: 816,
            category_label: category,
            description,
            transfer_accounts: None,
            source: None,
        }
    }

    #[test]
    fn width_and_case_variants_collide() {
        let a = entry_fingerprint(&base("ＡＭＡＺＯＮ．ＣＯ．ＪＰ", "通販"));
        let b = entry_fingerprint(&base("amazon.co.jp", "通販"));
        let c = entry_fingerprint(&base("Amazon.CO.jp", "通販"));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn amount_and_date_discriminate() {
        let a = entry_fingerprint(&base("amazon.co.jp", "通販"));
        let mut other = base("amazon.co.jp", "通販");
        other.amount = 817;
        assert_ne!(a, entry_fingerprint(&other));

        let mut other = base("amazon.co.jp", "通販");
        other.date = NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        assert_ne!(a, entry_fingerprint(&other));
    }

    #[test]
    fn category_label_discriminates() {
        assert_ne!(
            entry_fingerprint(&base("amazon.co.jp", "通販")),
            entry_fingerprint(&base("amazon.co.jp", "書籍")),
        );
    }

    #[test]
    fn transfer_includes_both_accounts() {
        let mut input = base("口座振替", "");
        input.kind = EntryKind::Transfer;
        input.transfer_accounts = Some((AccountId(1), AccountId(2)));
        let a = entry_fingerprint(&input);

        input.transfer_accounts = Some((AccountId(1), AccountId(3)));
        assert_ne!(a, entry_fingerprint(&input));
    }

    #[test]
    fn non_transfer_ignores_accounts() {
        let mut input = base("amazon.co.jp", "通販");
        input.transfer_accounts = Some((AccountId(1), AccountId(2)));
        assert_eq!(entry_fingerprint(&input), entry_fingerprint(&base("amazon.co.jp", "通販")));
    }

    #[test]
    fn source_discriminates_when_present() {
        let mut input = base("amazon.co.jp", "通販");
        input.source = Some("abc123");
        assert_ne!(entry_fingerprint(&input), entry_fingerprint(&base("amazon.co.jp", "通販")));
    }

    #[test]
    fn deterministic() {
        let input = base("ローソン 渋谷", "食費");
        assert_eq!(entry_fingerprint(&input), entry_fingerprint(&input));
    }
}
