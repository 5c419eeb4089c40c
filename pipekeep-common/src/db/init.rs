//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date.
//! Every statement is idempotent, so opening an existing database is safe.

use crate::db::settings::{
    set_setting, GRACE_PERIOD_HOURS_KEY, RATIO_HEALTHY_MAX_KEY, RATIO_RISK_MIN_KEY,
    STALE_AFTER_HOURS_KEY,
};
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

/// Schema version written on initialization
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL lets the reconciler read while a batch pass is writing
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// The connection is never recycled, so the data lives as long as the pool.
pub async fn init_in_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_owners_table(pool).await?;
    create_leads_table(pool).await?;
    create_lead_activities_table(pool).await?;
    create_touchpoints_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    debug!("Schema at version {}", SCHEMA_VERSION);
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_owners_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS owners (
            name TEXT PRIMARY KEY,
            role TEXT NOT NULL DEFAULT 'seller',
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            guid TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'new',
            warning_sent INTEGER NOT NULL DEFAULT 0,
            warning_date TIMESTAMP,
            created_at TIMESTAMP NOT NULL,
            last_update TIMESTAMP NOT NULL,
            next_touch_id TEXT,
            closed_at TIMESTAMP,
            notes TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_leads_status_owner ON leads(status, owner)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_leads_warning_sent ON leads(warning_sent)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_leads_status_closed_at ON leads(status, closed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lead_activities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lead_activities (
            guid TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL REFERENCES leads(guid) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            occurred_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lead_activities_lead ON lead_activities(lead_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_touchpoints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS touchpoints (
            guid TEXT PRIMARY KEY,
            lead_id TEXT NOT NULL REFERENCES leads(guid) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            scheduled_at TIMESTAMP NOT NULL,
            cancelled INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed default settings, leaving existing non-NULL values alone
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, STALE_AFTER_HOURS_KEY, "72").await?;
    ensure_setting(pool, GRACE_PERIOD_HOURS_KEY, "24").await?;
    ensure_setting(pool, RATIO_HEALTHY_MAX_KEY, "15").await?;
    ensure_setting(pool, RATIO_RISK_MIN_KEY, "30").await?;
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let current: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    if current.flatten().is_none() {
        set_setting(pool, key, default_value).await?;
    }

    Ok(())
}
