use kakeibo_core::entry::ImportHistory;
use kakeibo_core::text::fold;
use kakeibo_import::session::{CommitPlan, RetroactiveUpdate};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DbPool;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    /// The atomic batch write failed; nothing from the batch is visible and
    /// the session may retry unchanged.
    #[error("commit failed: {0}")]
    CommitFailed(#[source] sqlx::Error),
    /// The batch could not be fully undone; never reported as success.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub import_id: String,
    pub committed: i64,
    pub skipped_duplicate: i64,
    pub invalid: i64,
    /// Ids of the entries this batch created, for the review screen.
    pub entry_ids: Vec<i64>,
}

/// Write a confirmed commit plan as one transaction: every entry stamped
/// with a fresh batch id, plus the import-history record. All or nothing;
/// on failure the ledger is untouched.
pub async fn commit_import(pool: &DbPool, plan: &CommitPlan) -> Result<CommitResult, StorageError> {
    let import_id = Uuid::new_v4().to_string();
    let entry_ids = write_batch(pool, plan, &import_id)
        .await
        .map_err(StorageError::CommitFailed)?;

    tracing::info!(
        import_id = %import_id,
        committed = entry_ids.len(),
        skipped_duplicate = plan.skipped_duplicate,
        invalid = plan.invalid,
        "import batch committed"
    );

    Ok(CommitResult {
        import_id,
        committed: entry_ids.len() as i64,
        skipped_duplicate: plan.skipped_duplicate,
        invalid: plan.invalid,
        entry_ids,
    })
}

async fn write_batch(
    pool: &DbPool,
    plan: &CommitPlan,
    import_id: &str,
) -> Result<Vec<i64>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let mut entry_ids = Vec::with_capacity(plan.entries.len());
    for entry in &plan.entries {
        let result = sqlx::query(
            "INSERT INTO entries
             (date, kind, amount_yen, description, category_id, fingerprint, source, import_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.date.format("%Y-%m-%d").to_string())
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(&entry.description)
        .bind(entry.category_id.0)
        .bind(&entry.fingerprint)
        .bind(&plan.file_fingerprint)
        .bind(import_id)
        .execute(&mut *tx)
        .await?;
        entry_ids.push(result.last_insert_rowid());
    }

    sqlx::query(
        "INSERT INTO import_history
         (import_id, file_fingerprint, committed_count, skipped_duplicate_count, invalid_count)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(import_id)
    .bind(&plan.file_fingerprint)
    .bind(entry_ids.len() as i64)
    .bind(plan.skipped_duplicate)
    .bind(plan.invalid)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(entry_ids)
}

/// Compensating operation: delete every entry stamped with the batch's
/// import id (legacy batches without the stamp fall back to matching the
/// source column against the file fingerprint), then the history record,
/// atomically. Returns how many entries were removed.
pub async fn rollback_import(
    pool: &DbPool,
    history: &ImportHistory,
) -> Result<u64, StorageError> {
    let removed = delete_batch(pool, history)
        .await
        .map_err(|e| StorageError::RollbackFailed(e.to_string()))?;
    tracing::info!(import_id = %history.import_id, removed, "import batch rolled back");
    Ok(removed)
}

async fn delete_batch(pool: &DbPool, history: &ImportHistory) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let mut removed = sqlx::query("DELETE FROM entries WHERE import_id = ?")
        .bind(&history.import_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed == 0 {
        removed = sqlx::query("DELETE FROM entries WHERE source = ? AND import_id IS NULL")
            .bind(&history.file_fingerprint)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    let history_deleted = sqlx::query("DELETE FROM import_history WHERE import_id = ?")
        .bind(&history.import_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if history_deleted == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    tx.commit().await?;
    Ok(removed)
}

/// Re-apply a resolve-step category decision to previously committed entries
/// sharing the folded description and kind. Returns the affected count.
pub async fn apply_category_retroactively(
    pool: &DbPool,
    update: &RetroactiveUpdate,
) -> Result<u64, StorageError> {
    let candidates = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, description FROM entries
         WHERE kind = ? AND (category_id IS NULL OR category_id != ?)",
    )
    .bind(update.kind.as_str())
    .bind(update.category_id.0)
    .fetch_all(pool)
    .await?;

    let matching: Vec<i64> = candidates
        .into_iter()
        .filter(|(_, description)| fold(description) == update.folded_description)
        .map(|(id, _)| id)
        .collect();

    let mut tx = pool.begin().await?;
    for id in &matching {
        sqlx::query("UPDATE entries SET category_id = ? WHERE id = ?")
            .bind(update.category_id.0)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(matching.len() as u64)
}
