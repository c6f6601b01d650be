pub mod entry;
pub mod fingerprint;
pub mod money;
pub mod text;

pub use entry::{
    AccountId, Category, CategoryId, EntryKind, ImportHistory, LedgerEntry,
};
pub use fingerprint::{entry_fingerprint, FingerprintInput};
pub use money::{parse_yen, AmountError};
pub use text::{fold, normalize};
