use std::collections::HashSet;

use chrono::NaiveDate;
use kakeibo_core::entry::{Category, CategoryId, EntryKind};
use kakeibo_core::fingerprint::{entry_fingerprint, FingerprintInput};
use kakeibo_core::text::normalize;
use serde::{Deserialize, Serialize};

use crate::columns::ColumnMap;
use crate::rules::RuleService;

/// Row state machine: every row starts Unresolved and settles into exactly
/// one of the four states during the build pass. Only user action can move
/// an Unresolved row toward commit afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Valid,
    Invalid { reason: String },
    Duplicate,
    Unresolved,
}

impl RowStatus {
    pub fn is_invalid(&self) -> bool {
        matches!(self, RowStatus::Invalid { .. })
    }
}

/// One parsed candidate transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRow {
    /// Index into the tokenized row set this draft came from.
    pub source_row: usize,
    /// Raw parsed cells, immutable once created.
    pub raw_cells: Vec<String>,
    pub occurred_on: Option<NaiveDate>,
    /// Integer yen; zero for rows that failed amount parsing.
    pub amount: i64,
    pub kind: EntryKind,
    /// Normalized free text (width-folded, whitespace-collapsed).
    pub description: String,
    /// Raw category label cell, if the format exposes one.
    pub raw_category_label: String,
    pub suggested_category_id: Option<CategoryId>,
    pub final_category_id: Option<CategoryId>,
    pub status: RowStatus,
    /// Computed once at build time; absent for invalid rows. Never
    /// recomputed, even after the category is edited.
    pub fingerprint: Option<String>,
}

impl DraftRow {
    /// The category a commit would use: a user decision wins over the
    /// engine's suggestion.
    pub fn resolved_category(&self) -> Option<CategoryId> {
        self.final_category_id.or(self.suggested_category_id)
    }

    /// Whether a commit would include this row.
    pub fn is_committable(&self) -> bool {
        match self.status {
            RowStatus::Valid => true,
            RowStatus::Unresolved => self.final_category_id.is_some(),
            _ => false,
        }
    }
}

/// Fingerprints of the existing ledger, snapshotted once at batch start,
/// plus an in-memory overlay for duplicates within the batch itself. The
/// snapshot is never written back into, so it stays reusable for audit
/// comparisons.
#[derive(Debug, Clone)]
pub struct DuplicateIndex {
    snapshot: HashSet<String>,
    overlay: HashSet<String>,
}

impl DuplicateIndex {
    pub fn new(snapshot: HashSet<String>) -> Self {
        Self { snapshot, overlay: HashSet::new() }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.snapshot.contains(fingerprint) || self.overlay.contains(fingerprint)
    }

    /// Record a fingerprint seen earlier in the current batch.
    pub fn note(&mut self, fingerprint: &str) {
        self.overlay.insert(fingerprint.to_string());
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }
}

/// Leading rows without a parseable date are treated as header/preamble and
/// skipped, up to this many (card exports carry a masked-number line plus a
/// header line).
const MAX_HEADER_ROWS: usize = 3;

/// Turns tokenized rows into draft candidates. Holds only borrowed
/// collaborators; building twice over the same inputs yields identical
/// drafts.
pub struct DraftBuilder<'a> {
    map: &'a ColumnMap,
    rules: &'a RuleService,
    categories: &'a [Category],
    /// Import source identifier stamped into fingerprints (the batch's file
    /// fingerprint), when known.
    source: Option<&'a str>,
}

impl<'a> DraftBuilder<'a> {
    pub fn new(
        map: &'a ColumnMap,
        rules: &'a RuleService,
        categories: &'a [Category],
        source: Option<&'a str>,
    ) -> Self {
        Self { map, rules, categories, source }
    }

    /// Run the row state machine over the whole batch. `index` accumulates
    /// the batch's own fingerprints in its overlay, so same-file duplicates
    /// are flagged too.
    pub fn build(&self, rows: &[Vec<String>], index: &mut DuplicateIndex) -> Vec<DraftRow> {
        let start = self.header_rows(rows);
        let end = self.data_end(rows, start);

        let mut drafts = Vec::with_capacity(end.saturating_sub(start));
        for (source_row, row) in rows.iter().enumerate().take(end).skip(start) {
            drafts.push(self.build_row(source_row, row, index));
        }
        drafts
    }

    fn build_row(
        &self,
        source_row: usize,
        row: &[String],
        index: &mut DuplicateIndex,
    ) -> DraftRow {
        let raw_cells = row.to_vec();
        let description = normalize(self.map.description(row));
        let raw_category_label = self.map.category_label(row).to_string();

        let invalid = |reason: String| DraftRow {
            source_row,
            raw_cells: raw_cells.clone(),
            occurred_on: None,
            amount: 0,
            kind: EntryKind::Expense,
            description: description.clone(),
            raw_category_label: raw_category_label.clone(),
            suggested_category_id: None,
            final_category_id: None,
            status: RowStatus::Invalid { reason },
            fingerprint: None,
        };

        // 1. Parse date and amount/kind; failure makes the row invalid and
        //    excludes it from everything downstream, fingerprinting included.
        let occurred_on = match self.map.date(row) {
            Ok(date) => date,
            Err(e) => return invalid(e.to_string()),
        };
        let (kind, amount) = match self.map.pick_kind_amount(row) {
            Ok(pair) => pair,
            Err(e) => return invalid(e.to_string()),
        };

        // 2. Classify first so the fingerprint can key off the resolved
        //    category name, falling back to the raw label.
        let suggested = self
            .rules
            .suggest(&[description.as_str(), raw_category_label.as_str()], kind);
        let category_label = suggested
            .and_then(|id| self.category_name(id))
            .unwrap_or(&raw_category_label);

        let fingerprint = entry_fingerprint(&FingerprintInput {
            date: occurred_on,
            kind,
            amount,
            category_label,
            description: &description,
            transfer_accounts: None,
            source: self.source,
        });

        // 3. Duplicate against the ledger snapshot or earlier rows of this
        //    same batch; still visible for audit, never committed.
        let status = if index.contains(&fingerprint) {
            RowStatus::Duplicate
        } else {
            index.note(&fingerprint);
            // 4. Classified rows are valid; the rest need user action.
            if suggested.is_some() {
                RowStatus::Valid
            } else {
                RowStatus::Unresolved
            }
        };

        DraftRow {
            source_row,
            raw_cells,
            occurred_on: Some(occurred_on),
            amount,
            kind,
            description,
            raw_category_label,
            suggested_category_id: suggested,
            final_category_id: None,
            status,
            fingerprint: Some(fingerprint),
        }
    }

    fn category_name(&self, id: CategoryId) -> Option<&'a str> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    fn header_rows(&self, rows: &[Vec<String>]) -> usize {
        rows.iter()
            .take(MAX_HEADER_ROWS)
            .take_while(|row| self.map.date(row).is_err())
            .count()
    }

    /// Exclusive end of the data range. A trailing row is the vendor total
    /// line, not data, when it has no date and its amount cell equals the
    /// sum of the preceding data rows.
    fn data_end(&self, rows: &[Vec<String>], start: usize) -> usize {
        let Some(amount_col) = self.map.amount else {
            return rows.len();
        };
        if rows.len() <= start + 1 {
            return rows.len();
        }
        let last = &rows[rows.len() - 1];
        if self.map.date(last).is_ok() {
            return rows.len();
        }
        let total: i64 = rows[start..rows.len() - 1]
            .iter()
            .filter(|row| self.map.date(row).is_ok())
            .filter_map(|row| row.get(amount_col))
            .filter_map(|cell| kakeibo_core::money::parse_yen(cell).ok())
            .sum();
        let is_summary = last
            .iter()
            .any(|cell| kakeibo_core::money::parse_yen(cell) == Ok(total));
        if is_summary {
            rows.len() - 1
        } else {
            rows.len()
        }
    }
}
