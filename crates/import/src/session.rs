use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use kakeibo_core::entry::{Category, CategoryId, EntryKind};
use kakeibo_core::text::fold;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::columns::{ColumnMap, ColumnOverride};
use crate::detect::{detect_with_preference, Detection, StatementFormat};
use crate::draft::{DraftBuilder, DraftRow, DuplicateIndex, RowStatus};
use crate::rules::{LearnOutcome, RuleService};
use crate::tokenizer::{decode_statement, split_rows, TokenizeError};

/// Wizard stages, in order. Forward moves are explicit; backward moves are
/// always legal and lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Settings,
    Preview,
    Resolve,
    Summary,
    Committed,
}

impl Stage {
    fn order(self) -> u8 {
        match self {
            Stage::Settings => 0,
            Stage::Preview => 1,
            Stage::Resolve => 2,
            Stage::Summary => 3,
            Stage::Committed => 4,
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("{operation} is not legal in the {stage:?} stage")]
    InvalidStage { stage: Stage, operation: &'static str },
    #[error("no drafts to operate on; build the preview first")]
    NoDrafts,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Format chosen by the user; non-generic choices are binding.
    pub forced_format: Option<StatementFormat>,
    /// Manual column mapping; wins over detection and heuristics.
    pub column_override: Option<ColumnOverride>,
    /// How many invalid-row reasons the summary retains verbatim. Total
    /// counts are always exact; only the sample list is capped.
    pub diagnostic_sample_cap: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            forced_format: None,
            column_override: None,
            diagnostic_sample_cap: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    Unresolved,
    Duplicate,
    Invalid,
}

/// Counts shown on the summary step, always available before a commit is
/// allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub valid: usize,
    pub duplicate: usize,
    pub invalid: usize,
    pub unresolved: usize,
    /// Unresolved rows the user has since given a final category; these
    /// commit alongside the valid ones.
    pub resolved_by_user: usize,
    pub invalid_samples: Vec<(usize, String)>,
    pub samples_truncated: bool,
}

/// One row of an agreed commit. Produced only by [`ImportSession::confirm_commit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedEntry {
    pub date: NaiveDate,
    pub kind: EntryKind,
    pub amount: i64,
    pub description: String,
    pub category_id: CategoryId,
    pub fingerprint: String,
}

/// Everything the commit coordinator needs; obtainable only from the
/// Summary stage, which is what rejects commit-from-preview at the API
/// level rather than by UI gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitPlan {
    pub file_fingerprint: String,
    pub entries: Vec<PlannedEntry>,
    pub skipped_duplicate: i64,
    pub invalid: i64,
    pub skipped_unresolved: i64,
}

/// A resolve-step request to re-apply a category decision to already
/// committed entries with the same folded description and kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetroactiveUpdate {
    pub folded_description: String,
    pub kind: EntryKind,
    pub category_id: CategoryId,
}

/// The multi-stage import wizard. One session per file; single-threaded by
/// construction (no interior mutability, `&mut self` for every mutation).
pub struct ImportSession {
    stage: Stage,
    config: SessionConfig,
    rows: Vec<Vec<String>>,
    file_fingerprint: String,
    encoding: &'static str,
    detection: Option<Detection>,
    column_map: Option<ColumnMap>,
    drafts: Vec<DraftRow>,
    /// User category decisions keyed by folded description. Survives
    /// backward navigation and preview rebuilds.
    resolutions: HashMap<String, CategoryId>,
    import_id: Option<String>,
}

impl ImportSession {
    /// Decode and tokenize the file. Decode failure is fatal to the batch
    /// and surfaces before any parsing.
    pub fn open(bytes: &[u8], config: SessionConfig) -> Result<Self, ImportError> {
        let decoded = decode_statement(bytes)?;
        let rows = split_rows(&decoded.text)?;
        let file_fingerprint = content_fingerprint(&decoded.text);
        tracing::debug!(
            encoding = decoded.encoding,
            rows = rows.len(),
            fingerprint = %file_fingerprint,
            "import session opened"
        );
        Ok(Self {
            stage: Stage::Settings,
            config,
            rows,
            file_fingerprint,
            encoding: decoded.encoding,
            detection: None,
            column_map: None,
            drafts: Vec::new(),
            resolutions: HashMap::new(),
            import_id: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn file_fingerprint(&self) -> &str {
        &self.file_fingerprint
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding
    }

    pub fn detection(&self) -> Option<Detection> {
        self.detection
    }

    pub fn drafts(&self) -> &[DraftRow] {
        &self.drafts
    }

    pub fn import_id(&self) -> Option<&str> {
        self.import_id.as_deref()
    }

    /// Adjust the manual column mapping; Settings only (go back first).
    pub fn set_column_override(
        &mut self,
        override_map: Option<ColumnOverride>,
    ) -> Result<(), ImportError> {
        self.expect_stage(Stage::Settings, "set_column_override")?;
        self.config.column_override = override_map;
        Ok(())
    }

    /// Run detection, column mapping, and the draft build, then advance to
    /// Preview. Legal from Settings (including after navigating back);
    /// previously entered resolutions are re-applied to the fresh drafts.
    pub fn build_preview(
        &mut self,
        rules: &RuleService,
        categories: &[Category],
        ledger_fingerprints: HashSet<String>,
    ) -> Result<(), ImportError> {
        self.expect_stage(Stage::Settings, "build_preview")?;

        let detection = detect_with_preference(&self.rows, self.config.forced_format);
        let map = ColumnMap::build(
            &self.rows,
            detection.format,
            self.config.column_override.as_ref(),
        );

        let builder = DraftBuilder::new(
            &map,
            rules,
            categories,
            Some(self.file_fingerprint.as_str()),
        );
        let mut index = DuplicateIndex::new(ledger_fingerprints);
        let mut drafts = builder.build(&self.rows, &mut index);

        for draft in &mut drafts {
            if !matches!(draft.status, RowStatus::Valid | RowStatus::Unresolved) {
                continue;
            }
            if let Some(category) = self.resolutions.get(&fold(&draft.description)) {
                draft.final_category_id = Some(*category);
            }
        }

        tracing::info!(
            format = detection.format.as_str(),
            confidence = detection.confidence,
            drafts = drafts.len(),
            "preview built"
        );
        self.detection = Some(detection);
        self.column_map = Some(map);
        self.drafts = drafts;
        self.stage = Stage::Preview;
        Ok(())
    }

    /// Filterable read-only view over the drafts.
    pub fn filtered(&self, filter: RowFilter) -> Vec<&DraftRow> {
        self.drafts
            .iter()
            .filter(|d| match filter {
                RowFilter::All => true,
                RowFilter::Unresolved => d.status == RowStatus::Unresolved,
                RowFilter::Duplicate => d.status == RowStatus::Duplicate,
                RowFilter::Invalid => d.status.is_invalid(),
            })
            .collect()
    }

    pub fn advance_to_resolve(&mut self) -> Result<(), ImportError> {
        self.expect_stage(Stage::Preview, "advance_to_resolve")?;
        self.stage = Stage::Resolve;
        Ok(())
    }

    pub fn advance_to_summary(&mut self) -> Result<(), ImportError> {
        self.expect_stage(Stage::Resolve, "advance_to_summary")?;
        self.stage = Stage::Summary;
        Ok(())
    }

    /// Navigate back to any earlier stage. Manual mappings and category
    /// resolutions are kept. Not available once committed.
    pub fn back_to(&mut self, target: Stage) -> Result<(), ImportError> {
        if self.stage == Stage::Committed || target.order() >= self.stage.order() {
            return Err(ImportError::InvalidStage {
                stage: self.stage,
                operation: "back_to",
            });
        }
        self.stage = target;
        Ok(())
    }

    /// Set the final category for every row sharing this folded description.
    /// Returns how many rows were touched. The engine's suggestion is left
    /// intact underneath.
    pub fn resolve_group(
        &mut self,
        description: &str,
        category_id: CategoryId,
    ) -> Result<usize, ImportError> {
        self.expect_stage(Stage::Resolve, "resolve_group")?;
        if self.drafts.is_empty() {
            return Err(ImportError::NoDrafts);
        }
        let key = fold(description);
        let mut touched = 0;
        for draft in &mut self.drafts {
            let groupable =
                matches!(draft.status, RowStatus::Unresolved | RowStatus::Valid);
            if groupable && fold(&draft.description) == key {
                draft.final_category_id = Some(category_id);
                touched += 1;
            }
        }
        if touched > 0 {
            self.resolutions.insert(key, category_id);
        }
        Ok(touched)
    }

    /// Feed the group's representative description into the rule engine.
    pub fn learn_resolution(
        &self,
        rules: &mut RuleService,
        description: &str,
    ) -> Result<LearnOutcome, ImportError> {
        self.expect_stage(Stage::Resolve, "learn_resolution")?;
        let key = fold(description);
        let Some((category_id, kind)) = self.resolution_for(&key) else {
            return Err(ImportError::NoDrafts);
        };
        Ok(rules.learn(description, kind, category_id))
    }

    /// Build the request for re-applying this resolution to previously
    /// committed entries; the storage collaborator executes it.
    pub fn retroactive_update(
        &self,
        description: &str,
    ) -> Result<RetroactiveUpdate, ImportError> {
        self.expect_stage(Stage::Resolve, "retroactive_update")?;
        let key = fold(description);
        let Some((category_id, kind)) = self.resolution_for(&key) else {
            return Err(ImportError::NoDrafts);
        };
        Ok(RetroactiveUpdate {
            folded_description: key,
            kind,
            category_id,
        })
    }

    fn resolution_for(&self, key: &str) -> Option<(CategoryId, EntryKind)> {
        let category_id = *self.resolutions.get(key)?;
        let kind = self
            .drafts
            .iter()
            .find(|d| fold(&d.description) == key)
            .map(|d| d.kind)?;
        Some((category_id, kind))
    }

    /// Status counts plus a capped sample of invalid reasons. Available from
    /// Preview onward so the summary step can always show them.
    pub fn summary(&self) -> Result<ImportSummary, ImportError> {
        if self.stage == Stage::Settings {
            return Err(ImportError::InvalidStage {
                stage: self.stage,
                operation: "summary",
            });
        }

        let mut summary = ImportSummary {
            valid: 0,
            duplicate: 0,
            invalid: 0,
            unresolved: 0,
            resolved_by_user: 0,
            invalid_samples: Vec::new(),
            samples_truncated: false,
        };
        for draft in &self.drafts {
            match &draft.status {
                RowStatus::Valid => summary.valid += 1,
                RowStatus::Duplicate => summary.duplicate += 1,
                RowStatus::Invalid { reason } => {
                    summary.invalid += 1;
                    if summary.invalid_samples.len() < self.config.diagnostic_sample_cap {
                        summary.invalid_samples.push((draft.source_row, reason.clone()));
                    } else {
                        summary.samples_truncated = true;
                    }
                }
                RowStatus::Unresolved => {
                    summary.unresolved += 1;
                    if draft.final_category_id.is_some() {
                        summary.resolved_by_user += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Explicit confirmation on the Summary stage; the only way to obtain a
    /// commit plan. Nothing here mutates the session, so a failed commit can
    /// retry with the same plan or a fresh one.
    pub fn confirm_commit(&self) -> Result<CommitPlan, ImportError> {
        self.expect_stage(Stage::Summary, "confirm_commit")?;

        let mut plan = CommitPlan {
            file_fingerprint: self.file_fingerprint.clone(),
            entries: Vec::new(),
            skipped_duplicate: 0,
            invalid: 0,
            skipped_unresolved: 0,
        };
        for draft in &self.drafts {
            match &draft.status {
                RowStatus::Duplicate => plan.skipped_duplicate += 1,
                RowStatus::Invalid { .. } => plan.invalid += 1,
                RowStatus::Valid | RowStatus::Unresolved => {
                    if !draft.is_committable() {
                        plan.skipped_unresolved += 1;
                        continue;
                    }
                    if let (Some(date), Some(fingerprint), Some(category_id)) = (
                        draft.occurred_on,
                        draft.fingerprint.clone(),
                        draft.resolved_category(),
                    ) {
                        plan.entries.push(PlannedEntry {
                            date,
                            kind: draft.kind,
                            amount: draft.amount,
                            description: draft.description.clone(),
                            category_id,
                            fingerprint,
                        });
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Record a completed commit; the session is finished afterwards.
    pub fn mark_committed(&mut self, import_id: String) -> Result<(), ImportError> {
        self.expect_stage(Stage::Summary, "mark_committed")?;
        self.import_id = Some(import_id);
        self.stage = Stage::Committed;
        Ok(())
    }

    fn expect_stage(&self, expected: Stage, operation: &'static str) -> Result<(), ImportError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ImportError::InvalidStage { stage: self.stage, operation })
        }
    }
}

/// Content hash of the decoded statement with line endings normalized, so
/// the same export re-saved under a different encoding or newline convention
/// still warns as a re-import.
fn content_fingerprint(text: &str) -> String {
    let canonical = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
