/*!
 * Database schema definitions and migrations.
 *
 * This module contains the SQL schema for all database tables
 * and handles schema migrations for version upgrades.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Foreign keys are per-connection, so enable them on every open
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing database schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        debug!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version in the database
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Create all database tables
fn create_all_tables(conn: &Connection) -> Result<()> {
    // WAL lets the scheduler and request handlers share the file
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS validation_rules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            rule_type TEXT NOT NULL CHECK (rule_type IN ('safety', 'quality', 'plagiarism')),
            is_active INTEGER NOT NULL DEFAULT 1,
            config TEXT NOT NULL,
            severity TEXT NOT NULL CHECK (severity IN ('low', 'medium', 'high', 'critical')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rules_active ON validation_rules(is_active, rule_type);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS works (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            require_deal_approval INTEGER NOT NULL DEFAULT 0,
            published_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            work_id TEXT NOT NULL REFERENCES works(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            published_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sections_work ON sections(work_id);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS moderation_queue (
            id TEXT PRIMARY KEY,
            subject_kind TEXT NOT NULL CHECK (subject_kind IN ('work', 'section')),
            subject_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            priority TEXT NOT NULL,
            priority_rank INTEGER NOT NULL,
            flagged INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            reviewed_by TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_queue_listing ON moderation_queue(status, priority_rank DESC, created_at ASC);
        CREATE INDEX IF NOT EXISTS idx_queue_subject ON moderation_queue(subject_kind, subject_id);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS validation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_kind TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            passed INTEGER NOT NULL,
            score REAL NOT NULL,
            flags TEXT NOT NULL,
            details TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_validation_subject ON validation_results(subject_kind, subject_id, created_at);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_jobs (
            id TEXT PRIMARY KEY,
            subject_kind TEXT,
            subject_id TEXT,
            text TEXT,
            image_url TEXT,
            is_first_chapter INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL,
            claimed_at TEXT,
            finished_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_status ON assessment_jobs(status, created_at);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS fan_variants (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('translation', 'audiobook')),
            work_id TEXT NOT NULL REFERENCES works(id) ON DELETE CASCADE,
            section_id TEXT NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
            language TEXT NOT NULL,
            contributor_id TEXT NOT NULL,
            status TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            readability_avg REAL NOT NULL DEFAULT 0,
            comprehension_avg REAL NOT NULL DEFAULT 0,
            polish_avg REAL NOT NULL DEFAULT 0,
            quality_overall REAL NOT NULL DEFAULT 0,
            rating_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_variants_target ON fan_variants(section_id, kind, language);

        CREATE TABLE IF NOT EXISTS fan_votes (
            user_id TEXT NOT NULL,
            variant_id TEXT NOT NULL REFERENCES fan_variants(id) ON DELETE CASCADE,
            readability INTEGER NOT NULL CHECK (readability BETWEEN 1 AND 5),
            comprehension INTEGER NOT NULL CHECK (comprehension BETWEEN 1 AND 5),
            polish INTEGER NOT NULL CHECK (polish BETWEEN 1 AND 5),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, variant_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_variant ON fan_votes(variant_id);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tier3_deals (
            id TEXT PRIMARY KEY,
            work_id TEXT NOT NULL REFERENCES works(id) ON DELETE CASCADE,
            variant_id TEXT NOT NULL REFERENCES fan_variants(id) ON DELETE CASCADE,
            creator_id TEXT NOT NULL,
            contributor_id TEXT NOT NULL,
            content_type TEXT NOT NULL,
            revenue_share_percent REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_creator',
            rejection_reason TEXT,
            created_at TEXT NOT NULL,
            accepted_at TEXT,
            decided_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_deals_creator ON tier3_deals(creator_id, status);
        "#,
    )?;

    info!("Database schema created successfully");
    Ok(())
}

/// Migrate the schema from one version to another
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    let current = from_version;

    if current < SCHEMA_VERSION {
        return Err(anyhow::anyhow!(
            "Unknown schema version: {}. Cannot migrate.",
            current
        ));
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    info!("Schema migration completed to v{}", SCHEMA_VERSION);
    Ok(())
}
