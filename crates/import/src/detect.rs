use std::sync::OnceLock;

use kakeibo_core::money::parse_yen;
use kakeibo_core::text::{fold, normalize};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::util::parse_statement_date;

/// Closed set of statement layouts the importer understands. One variant per
/// vendor family plus a generic fallback; each pairs a fixed column table
/// (see `columns`) with an amount/kind resolution rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementFormat {
    /// Bank account export: separate withdrawal (出金) and deposit (入金)
    /// columns, trailing balance column.
    BankDeposit,
    /// Credit card export: single unsigned amount column, masked card number
    /// in the preamble, trailing total row.
    VendorCard,
    /// Mobile wallet export: single amount column, charge/payment wording.
    MobileWallet,
    /// Anything else; columns come from header heuristics or a user mapping.
    Generic,
}

impl StatementFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementFormat::BankDeposit => "bank_deposit",
            StatementFormat::VendorCard => "vendor_card",
            StatementFormat::MobileWallet => "mobile_wallet",
            StatementFormat::Generic => "generic",
        }
    }

    pub fn is_generic(self) -> bool {
        matches!(self, StatementFormat::Generic)
    }

    const KNOWN: [StatementFormat; 3] = [
        StatementFormat::BankDeposit,
        StatementFormat::VendorCard,
        StatementFormat::MobileWallet,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub format: StatementFormat,
    pub confidence: f32,
}

/// A known format must clear this before it beats the generic fallback.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Score every known layout over the full row set and select the best match
/// above the threshold, falling back to Generic. Read-only over `rows`;
/// running it twice on the same rows yields the identical result.
pub fn detect(rows: &[Vec<String>]) -> Detection {
    let mut best = Detection { format: StatementFormat::Generic, confidence: 0.0 };
    for format in StatementFormat::KNOWN {
        let confidence = score(format, rows);
        // Strictly-greater keeps the fixed evaluation order as tie-breaker.
        if confidence > best.confidence {
            best = Detection { format, confidence };
        }
    }
    if best.confidence >= CONFIDENCE_THRESHOLD {
        best
    } else {
        Detection { format: StatementFormat::Generic, confidence: 0.0 }
    }
}

/// Detection honoring a caller-chosen format. An explicit non-generic choice
/// is never downgraded; a generic choice is still run through detection as a
/// confirmatory upgrade.
pub fn detect_with_preference(
    rows: &[Vec<String>],
    preferred: Option<StatementFormat>,
) -> Detection {
    match preferred {
        Some(format) if !format.is_generic() => Detection { format, confidence: 1.0 },
        _ => detect(rows),
    }
}

fn score(format: StatementFormat, rows: &[Vec<String>]) -> f32 {
    if rows.is_empty() {
        return 0.0;
    }
    let raw = match format {
        StatementFormat::BankDeposit => score_bank_deposit(rows),
        StatementFormat::VendorCard => score_vendor_card(rows),
        StatementFormat::MobileWallet => score_mobile_wallet(rows),
        StatementFormat::Generic => 0.0,
    };
    raw.clamp(0.0, 1.0)
}

fn score_bank_deposit(rows: &[Vec<String>]) -> f32 {
    let header = fold(&rows[0].join(","));
    let mut s = 0.0;
    if header.contains("出金") && header.contains("入金") {
        s += 0.5;
    }
    if contains_any_keyword(rows, &["振込", "振替", "お引出し", "お預入れ", "普通預金"]) {
        s += 0.2;
    }
    s + 0.2 * date_consistency(rows) + 0.1 * column_consistency(rows)
}

fn score_vendor_card(rows: &[Vec<String>]) -> f32 {
    let mut s = 0.0;
    if rows.iter().any(|row| row.iter().any(|c| is_masked_card_number(c))) {
        s += 0.4;
    }
    if contains_any_keyword(rows, &["ご利用", "カード", "visa", "jcb", "mastercard"]) {
        s += 0.2;
    }
    if has_trailing_summary_row(rows, 2) {
        s += 0.25;
    }
    s + 0.15 * date_consistency(rows)
}

fn score_mobile_wallet(rows: &[Vec<String>]) -> f32 {
    let mut s = 0.0;
    if contains_any_keyword(rows, &["チャージ", "ウォレット", "ポイント払い", "ペイ", "pay残高"]) {
        s += 0.45;
    }
    let header = fold(&rows[0].join(","));
    if header.contains("金額") && !header.contains("出金") && !header.contains("入金") {
        s += 0.15;
    }
    s + 0.2 * date_consistency(rows)
}

fn contains_any_keyword(rows: &[Vec<String>], keywords: &[&str]) -> bool {
    rows.iter().any(|row| {
        row.iter().any(|cell| {
            let cell = fold(cell);
            keywords.iter().any(|kw| cell.contains(kw))
        })
    })
}

/// Masked account numbers look like `****-****-****-1234` or
/// `4980-12**-****-3456` once width-folded.
fn is_masked_card_number(cell: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9*]{4}([- ][0-9*]{4}){3}$").unwrap()
    });
    let cell = normalize(cell);
    cell.contains('*') && re.is_match(&cell)
}

/// True when the last row carries an amount equal to the sum of the amounts
/// of all preceding data rows (the vendor "total" line).
fn has_trailing_summary_row(rows: &[Vec<String>], amount_col: usize) -> bool {
    if rows.len() < 3 {
        return false;
    }
    let Some((last, data)) = rows.split_last() else {
        return false;
    };
    let amounts: Vec<i64> = data
        .iter()
        .filter_map(|row| row.get(amount_col))
        .filter_map(|cell| parse_yen(cell).ok())
        .collect();
    if amounts.len() < 2 {
        return false;
    }
    let total: i64 = amounts.iter().sum();
    last.iter().any(|cell| parse_yen(cell) == Ok(total))
}

/// Fraction of non-header rows whose first cell parses as a date.
fn date_consistency(rows: &[Vec<String>]) -> f32 {
    let data = &rows[1.min(rows.len())..];
    if data.is_empty() {
        return 0.0;
    }
    let dated = data
        .iter()
        .filter(|row| row.first().is_some_and(|c| parse_statement_date(c).is_some()))
        .count();
    dated as f32 / data.len() as f32
}

/// Fraction of rows sharing the modal column count.
fn column_consistency(rows: &[Vec<String>]) -> f32 {
    let mut counts = std::collections::HashMap::new();
    for row in rows {
        *counts.entry(row.len()).or_insert(0usize) += 1;
    }
    let modal = counts.values().copied().max().unwrap_or(0);
    modal as f32 / rows.len() as f32
}
