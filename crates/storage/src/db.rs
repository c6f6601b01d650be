use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use kakeibo_core::entry::{Category, CategoryId, EntryKind, ImportHistory, LedgerEntry};
use kakeibo_import::rules::{ClassificationRule, RuleMatchType};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    connect(&format!("sqlite:{}?mode=rwc", path.display())).await
}

/// In-memory database; one connection so the database outlives queries.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    connect("sqlite::memory:").await
}

async fn connect(url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount_yen INTEGER NOT NULL,
            description TEXT NOT NULL,
            category_id INTEGER REFERENCES categories(id),
            account_id INTEGER,
            counter_account_id INTEGER,
            fingerprint TEXT NOT NULL,
            source TEXT,
            import_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classification_rules (
            id INTEGER PRIMARY KEY,
            keyword TEXT NOT NULL,
            match_type TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            priority INTEGER NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT NOT NULL UNIQUE,
            file_fingerprint TEXT NOT NULL,
            committed_count INTEGER NOT NULL,
            skipped_duplicate_count INTEGER NOT NULL,
            invalid_count INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_fingerprint ON entries(fingerprint)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_import_id ON entries(import_id)")
        .execute(pool)
        .await?;

    Ok(())
}

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("食費", "expense"),
    ("日用品", "expense"),
    ("交通費", "expense"),
    ("通販", "expense"),
    ("光熱費", "expense"),
    ("通信費", "expense"),
    ("医療費", "expense"),
    ("交際費", "expense"),
    ("趣味", "expense"),
    ("その他", "expense"),
    ("給与", "income"),
];

pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (name, kind) in DEFAULT_CATEGORIES {
        sqlx::query("INSERT OR IGNORE INTO categories (name, kind) VALUES (?, ?)")
            .bind(name)
            .bind(kind)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn insert_category(
    pool: &DbPool,
    name: &str,
    kind: EntryKind,
) -> Result<CategoryId, sqlx::Error> {
    let result = sqlx::query("INSERT INTO categories (name, kind) VALUES (?, ?)")
        .bind(name)
        .bind(kind.as_str())
        .execute(pool)
        .await?;
    Ok(CategoryId(result.last_insert_rowid()))
}

pub async fn load_categories(pool: &DbPool) -> Result<Vec<Category>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, kind FROM categories ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, name, kind)| {
            let kind = EntryKind::from_str(&kind)
                .map_err(|e| tracing::warn!(name = %name, "{e}, dropping category"))
                .ok()?;
            Some(Category { id: CategoryId(id), name, kind })
        })
        .collect())
}

/// The duplicate-index snapshot: every fingerprint currently in the ledger.
pub async fn load_fingerprints(pool: &DbPool) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT fingerprint FROM entries")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(fp,)| fp).collect())
}

pub async fn load_rules(pool: &DbPool) -> Result<Vec<ClassificationRule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, i64, String, i64, i64)>(
        "SELECT id, keyword, match_type, category_id, kind, priority, enabled
         FROM classification_rules ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, keyword, match_type, category_id, kind, priority, enabled)| {
            let match_type = RuleMatchType::from_str(&match_type)
                .map_err(|e| tracing::warn!(rule_id = id, "{e}, dropping rule"))
                .ok()?;
            let kind = EntryKind::from_str(&kind)
                .map_err(|e| tracing::warn!(rule_id = id, "{e}, dropping rule"))
                .ok()?;
            Some(ClassificationRule {
                id,
                keyword,
                match_type,
                category_id: CategoryId(category_id),
                kind,
                priority: priority as i32,
                enabled: enabled != 0,
            })
        })
        .collect())
}

/// Persist the full rule set (insert-or-replace keyed by rule id), so
/// learned and toggled rules survive a restart.
pub async fn save_rules(pool: &DbPool, rules: &[ClassificationRule]) -> Result<(), sqlx::Error> {
    for rule in rules {
        sqlx::query(
            "INSERT OR REPLACE INTO classification_rules
             (id, keyword, match_type, category_id, kind, priority, enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rule.id)
        .bind(&rule.keyword)
        .bind(rule.match_type.as_str())
        .bind(rule.category_id.0)
        .bind(rule.kind.as_str())
        .bind(rule.priority)
        .bind(rule.enabled)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Re-import warning lookup: has this exact file been committed before?
pub async fn find_history_by_file_fingerprint(
    pool: &DbPool,
    file_fingerprint: &str,
) -> Result<Option<ImportHistory>, sqlx::Error> {
    let row = sqlx::query_as::<_, (i64, String, String, i64, i64, i64, String)>(
        "SELECT id, import_id, file_fingerprint, committed_count,
                skipped_duplicate_count, invalid_count, created_at
         FROM import_history WHERE file_fingerprint = ?
         ORDER BY id DESC LIMIT 1",
    )
    .bind(file_fingerprint)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(history_from_row))
}

pub async fn list_import_history(pool: &DbPool) -> Result<Vec<ImportHistory>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, i64, i64, i64, String)>(
        "SELECT id, import_id, file_fingerprint, committed_count,
                skipped_duplicate_count, invalid_count, created_at
         FROM import_history ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(history_from_row).collect())
}

fn history_from_row(
    (id, import_id, file_fingerprint, committed, skipped, invalid, created_at): (
        i64,
        String,
        String,
        i64,
        i64,
        i64,
        String,
    ),
) -> ImportHistory {
    let created_at = chrono::NaiveDateTime::parse_from_str(&created_at, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc());
    ImportHistory {
        id: Some(id),
        import_id,
        file_fingerprint,
        committed_count: committed,
        skipped_duplicate_count: skipped,
        invalid_count: invalid,
        created_at,
    }
}

/// Entries created by one batch, for the post-commit review screen.
pub async fn entries_by_import_id(
    pool: &DbPool,
    import_id: &str,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, String, i64, String, Option<i64>, String, Option<String>, Option<String>)>(
        "SELECT id, date, kind, amount_yen, description, category_id, fingerprint, source, import_id
         FROM entries WHERE import_id = ? ORDER BY id",
    )
    .bind(import_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(
            |(id, date, kind, amount, description, category_id, fingerprint, source, import_id)| {
                let date = chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
                let kind = EntryKind::from_str(&kind).ok()?;
                Some(LedgerEntry {
                    id: Some(id),
                    date,
                    kind,
                    amount,
                    description,
                    category_id: category_id.map(CategoryId),
                    account_id: None,
                    counter_account_id: None,
                    fingerprint,
                    source,
                    import_id,
                })
            },
        )
        .collect())
}
