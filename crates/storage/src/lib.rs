pub mod commit;
pub mod db;

pub use commit::{
    apply_category_retroactively, commit_import, rollback_import, CommitResult, StorageError,
};
pub use db::{
    create_db, create_memory_db, entries_by_import_id, find_history_by_file_fingerprint,
    insert_category, list_import_history, load_categories, load_fingerprints, load_rules,
    save_rules, seed_default_categories, DbPool,
};
