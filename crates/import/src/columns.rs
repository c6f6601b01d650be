use chrono::NaiveDate;
use kakeibo_core::entry::EntryKind;
use kakeibo_core::money::parse_yen;
use kakeibo_core::text::fold;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::StatementFormat;
use crate::util::parse_statement_date;

/// Per-row failure; non-fatal, retained as the row's invalid reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("missing {0} column")]
    MissingColumn(&'static str),
    #[error("unparseable date: '{0}'")]
    InvalidDate(String),
    #[error("unparseable amount: '{0}'")]
    InvalidAmount(String),
    #[error("neither debit nor credit populated")]
    NeitherDebitNorCredit,
    #[error("both debit and credit populated")]
    BothDebitAndCredit,
}

/// User-supplied manual mapping; any populated field wins over both the
/// fixed format tables and the header heuristics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOverride {
    pub date: Option<usize>,
    pub description: Option<usize>,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub category: Option<usize>,
}

impl ColumnOverride {
    pub fn is_empty(&self) -> bool {
        *self == ColumnOverride::default()
    }
}

/// Resolved column indices for one statement file. Built once per batch and
/// applied identically to every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub format: StatementFormat,
    pub date: Option<usize>,
    pub description: Option<usize>,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub category: Option<usize>,
}

/// Bilingual header keywords for generic files, one list per field.
const DATE_HEADERS: &[&str] = &["日付", "取引日", "利用日", "ご利用日", "年月日", "date"];
const AMOUNT_HEADERS: &[&str] = &["金額", "ご利用金額", "利用金額", "amount"];
const DESCRIPTION_HEADERS: &[&str] =
    &["摘要", "内容", "取引内容", "ご利用先", "利用店名", "店名", "description", "memo"];
const DEBIT_HEADERS: &[&str] = &["出金", "支払金額", "お引出し", "引落", "withdrawal", "debit"];
const CREDIT_HEADERS: &[&str] = &["入金", "お預入れ", "預入", "deposit", "credit"];
const CATEGORY_HEADERS: &[&str] = &["カテゴリ", "費目", "分類", "category"];

impl ColumnMap {
    /// Resolve column indices for the chosen format. Known formats use their
    /// fixed tables; Generic inspects the header row; an override wins over
    /// both, field by field.
    pub fn build(
        rows: &[Vec<String>],
        format: StatementFormat,
        override_map: Option<&ColumnOverride>,
    ) -> ColumnMap {
        let mut map = match format {
            StatementFormat::BankDeposit => ColumnMap {
                format,
                date: Some(0),
                description: Some(1),
                amount: None,
                debit: Some(2),
                credit: Some(3),
                category: None,
            },
            StatementFormat::VendorCard | StatementFormat::MobileWallet => ColumnMap {
                format,
                date: Some(0),
                description: Some(1),
                amount: Some(2),
                debit: None,
                credit: None,
                category: None,
            },
            StatementFormat::Generic => Self::from_header(rows),
        };

        if let Some(ov) = override_map {
            map.date = ov.date.or(map.date);
            map.description = ov.description.or(map.description);
            map.amount = ov.amount.or(map.amount);
            map.debit = ov.debit.or(map.debit);
            map.credit = ov.credit.or(map.credit);
            map.category = ov.category.or(map.category);
        }

        map
    }

    fn from_header(rows: &[Vec<String>]) -> ColumnMap {
        let header: Vec<String> = rows
            .first()
            .map(|row| row.iter().map(|c| fold(c)).collect())
            .unwrap_or_default();

        let find = |keywords: &[&str]| {
            header
                .iter()
                .position(|cell| keywords.iter().any(|kw| cell.contains(kw)))
        };

        ColumnMap {
            format: StatementFormat::Generic,
            date: find(DATE_HEADERS),
            description: find(DESCRIPTION_HEADERS),
            amount: find(AMOUNT_HEADERS),
            debit: find(DEBIT_HEADERS),
            credit: find(CREDIT_HEADERS),
            category: find(CATEGORY_HEADERS),
        }
    }

    pub fn date(&self, row: &[String]) -> Result<NaiveDate, RowError> {
        let col = self.date.ok_or(RowError::MissingColumn("date"))?;
        let cell = row.get(col).map(String::as_str).unwrap_or("");
        parse_statement_date(cell).ok_or_else(|| RowError::InvalidDate(cell.trim().to_string()))
    }

    pub fn description<'a>(&self, row: &'a [String]) -> &'a str {
        self.description
            .and_then(|col| row.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn category_label<'a>(&self, row: &'a [String]) -> &'a str {
        self.category
            .and_then(|col| row.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Resolve the signed amount and transaction direction for one row.
    ///
    /// Single-amount layouts always yield Expense; layouts with distinct
    /// debit/credit columns yield Expense for a populated debit cell and
    /// Income for a populated credit cell. A row with neither or both
    /// populated is invalid.
    pub fn pick_kind_amount(&self, row: &[String]) -> Result<(EntryKind, i64), RowError> {
        if let Some(col) = self.amount {
            let cell = row.get(col).map(String::as_str).unwrap_or("");
            let amount = parse_yen(cell)
                .map_err(|_| RowError::InvalidAmount(cell.trim().to_string()))?;
            return Ok((EntryKind::Expense, amount));
        }

        let (debit_col, credit_col) = match (self.debit, self.credit) {
            (Some(d), Some(c)) => (d, c),
            _ => return Err(RowError::MissingColumn("amount")),
        };

        let debit = row.get(debit_col).filter(|c| !c.trim().is_empty());
        let credit = row.get(credit_col).filter(|c| !c.trim().is_empty());

        match (debit, credit) {
            (Some(cell), None) => {
                let amount = parse_yen(cell)
                    .map_err(|_| RowError::InvalidAmount(cell.trim().to_string()))?;
                Ok((EntryKind::Expense, amount))
            }
            (None, Some(cell)) => {
                let amount = parse_yen(cell)
                    .map_err(|_| RowError::InvalidAmount(cell.trim().to_string()))?;
                Ok((EntryKind::Income, amount))
            }
            (None, None) => Err(RowError::NeitherDebitNorCredit),
            (Some(_), Some(_)) => Err(RowError::BothDebitAndCredit),
        }
    }
}
