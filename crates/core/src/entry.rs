use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a ledger entry. Statement imports only ever produce
/// `Expense` and `Income`; `Transfer` exists for entries authored inside the
/// ledger (and participates in fingerprinting via its two accounts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Expense,
    Income,
    Transfer,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Expense => "expense",
            EntryKind::Income => "income",
            EntryKind::Transfer => "transfer",
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(EntryKind::Expense),
            "income" => Ok(EntryKind::Income),
            "transfer" => Ok(EntryKind::Transfer),
            other => Err(format!("unknown entry kind: '{other}'")),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub kind: EntryKind,
}

/// A committed ledger entry as the storage collaborator sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub kind: EntryKind,
    /// Integer yen; sign is always positive, direction lives in `kind`.
    pub amount: i64,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub account_id: Option<AccountId>,
    pub counter_account_id: Option<AccountId>,
    pub fingerprint: String,
    /// Import source identifier (the file fingerprint of the batch that
    /// created this entry), absent for manually entered rows.
    pub source: Option<String>,
    pub import_id: Option<String>,
}

/// One record per committed import batch; the handle for rollback and for
/// the "you already imported this file" warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportHistory {
    pub id: Option<i64>,
    pub import_id: String,
    pub file_fingerprint: String,
    pub committed_count: i64,
    pub skipped_duplicate_count: i64,
    pub invalid_count: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn entry_kind_round_trips_through_str() {
        for kind in [EntryKind::Expense, EntryKind::Income, EntryKind::Transfer] {
            assert_eq!(EntryKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(EntryKind::from_str("deposit").is_err());
    }
}
