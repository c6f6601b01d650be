pub mod columns;
pub mod detect;
pub mod draft;
pub mod remote;
pub mod rules;
pub mod session;
pub mod tokenizer;
pub(crate) mod util;

pub use columns::{ColumnMap, ColumnOverride, RowError};
pub use detect::{detect, detect_with_preference, Detection, StatementFormat};
pub use draft::{DraftBuilder, DraftRow, DuplicateIndex, RowStatus};
pub use remote::RemoteClassifier;
pub use rules::{
    ClassificationRule, LearnOutcome, RuleMatchType, RuleService, DEFAULT_RULES_TOML,
};
pub use session::{
    CommitPlan, ImportError, ImportSession, ImportSummary, PlannedEntry, RetroactiveUpdate,
    RowFilter, SessionConfig, Stage,
};
pub use tokenizer::{decode_statement, tokenize, DecodedStatement, TokenizeError};
