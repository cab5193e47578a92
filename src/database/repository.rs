/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 * State transitions are conditional single-row updates whose affected
 * row count tells the caller whether it won the transition.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};

use crate::rules::{DuplicateRuleName, RuleConfig, RuleStore, RuleType, Severity, ValidationRule};

use super::connection::DatabaseConnection;
use super::models::{
    now_timestamp, PublishStatus, SectionRecord, SubjectRef, ValidationResultRecord, WorkRecord,
};

mod assessment;
mod fan_content;
mod moderation;

pub use assessment::JobCounts;
pub use moderation::{QueueCounts, ReviewApplied};

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// The underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Work and Section Operations
    // =========================================================================

    /// Register a work
    pub async fn insert_work(&self, work: &WorkRecord) -> Result<()> {
        let work = work.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO works (id, owner_id, title, status, require_deal_approval, published_at, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        work.id,
                        work.owner_id,
                        work.title,
                        work.status.to_string(),
                        work.require_deal_approval,
                        work.published_at,
                        work.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get a work by ID
    pub async fn get_work(&self, work_id: &str) -> Result<Option<WorkRecord>> {
        let work_id = work_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_work_sync(conn, &work_id))
            .await
    }

    pub(crate) fn get_work_sync(conn: &Connection, work_id: &str) -> Result<Option<WorkRecord>> {
        let work = conn
            .query_row(
                r#"
                SELECT id, owner_id, title, status, require_deal_approval, published_at, created_at
                FROM works WHERE id = ?1
                "#,
                [work_id],
                |row| {
                    Ok(WorkRecord {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        title: row.get(2)?,
                        status: column_from_row(row, 3)?,
                        require_deal_approval: row.get(4)?,
                        published_at: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()?;

        Ok(work)
    }

    /// Register a section of an existing work
    pub async fn insert_section(&self, section: &SectionRecord) -> Result<()> {
        let section = section.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO sections (id, work_id, title, status, published_at, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        section.id,
                        section.work_id,
                        section.title,
                        section.status.to_string(),
                        section.published_at,
                        section.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Get a section by ID
    pub async fn get_section(&self, section_id: &str) -> Result<Option<SectionRecord>> {
        let section_id = section_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_section_sync(conn, &section_id))
            .await
    }

    pub(crate) fn get_section_sync(
        conn: &Connection,
        section_id: &str,
    ) -> Result<Option<SectionRecord>> {
        let section = conn
            .query_row(
                r#"
                SELECT id, work_id, title, status, published_at, created_at
                FROM sections WHERE id = ?1
                "#,
                [section_id],
                |row| {
                    Ok(SectionRecord {
                        id: row.get(0)?,
                        work_id: row.get(1)?,
                        title: row.get(2)?,
                        status: column_from_row(row, 3)?,
                        published_at: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        Ok(section)
    }

    /// Publish status of a subject, `None` when it does not exist
    pub async fn get_publish_status(&self, subject: &SubjectRef) -> Result<Option<PublishStatus>> {
        let subject = subject.clone();

        self.db
            .execute_async(move |conn| {
                let status = match &subject {
                    SubjectRef::Work(id) => Self::get_work_sync(conn, id)?.map(|w| w.status),
                    SubjectRef::Section(id) => Self::get_section_sync(conn, id)?.map(|s| s.status),
                };
                Ok(status)
            })
            .await
    }

    /// Set the publish status of a subject; returns false if it does not exist
    pub(crate) fn set_publish_status_sync(
        conn: &Connection,
        subject: &SubjectRef,
        status: PublishStatus,
    ) -> Result<bool> {
        let published_at = (status == PublishStatus::Published).then(now_timestamp);
        let sql = match subject {
            SubjectRef::Work(_) => {
                "UPDATE works SET status = ?1, published_at = COALESCE(?2, published_at) WHERE id = ?3"
            }
            SubjectRef::Section(_) => {
                "UPDATE sections SET status = ?1, published_at = COALESCE(?2, published_at) WHERE id = ?3"
            }
        };
        let changed = conn.execute(sql, params![status.to_string(), published_at, subject.id()])?;
        Ok(changed == 1)
    }

    // =========================================================================
    // Rule Operations
    // =========================================================================

    fn query_rules(
        conn: &Connection,
        active_only: bool,
        rule_type: Option<RuleType>,
    ) -> Result<Vec<ValidationRule>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, rule_type, is_active, config, severity
            FROM validation_rules
            WHERE (?1 = 0 OR is_active = 1)
              AND (?2 IS NULL OR rule_type = ?2)
            ORDER BY name
            "#,
        )?;

        let rows = stmt.query_map(
            params![active_only, rule_type.map(|t| t.to_string())],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let mut rules = Vec::new();
        for row in rows {
            let (id, name, rule_type, is_active, config, severity) = row?;
            match Self::build_rule(id, name, &rule_type, is_active, &config, &severity) {
                Ok(rule) => rules.push(rule),
                Err(e) => warn!("Ignoring unreadable rule row: {:#}", e),
            }
        }
        Ok(rules)
    }

    fn build_rule(
        id: String,
        name: String,
        rule_type: &str,
        is_active: bool,
        config: &str,
        severity: &str,
    ) -> Result<ValidationRule> {
        let rule_type: RuleType = rule_type.parse()?;
        let severity: Severity = severity.parse()?;
        let config = RuleConfig::parse(rule_type, config)?;
        Ok(ValidationRule {
            id,
            name,
            is_active,
            severity,
            config,
        })
    }

    fn find_rule_sync(conn: &Connection, column: &str, value: &str) -> Result<Option<ValidationRule>> {
        let sql = format!(
            "SELECT id, name, rule_type, is_active, config, severity FROM validation_rules WHERE {} = ?1",
            column
        );
        let row = conn
            .query_row(&sql, [value], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()?;

        match row {
            Some((id, name, rule_type, is_active, config, severity)) => Ok(Some(
                Self::build_rule(id, name, &rule_type, is_active, &config, &severity)?,
            )),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Validation Result Operations
    // =========================================================================

    /// Append a validation verdict; returns the new row id
    pub async fn insert_validation_result(&self, record: &ValidationResultRecord) -> Result<i64> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| Self::insert_validation_result_sync(conn, &record))
            .await
    }

    pub(crate) fn insert_validation_result_sync(
        conn: &Connection,
        record: &ValidationResultRecord,
    ) -> Result<i64> {
        conn.execute(
            r#"
            INSERT INTO validation_results (subject_kind, subject_id, passed, score, flags, details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.subject.kind(),
                record.subject.id(),
                record.passed,
                record.score,
                serde_json::to_string(&record.flags)?,
                serde_json::to_string(&record.details)?,
                record.created_at,
            ],
        )?;
        debug!("Stored validation result for {}", record.subject);
        Ok(conn.last_insert_rowid())
    }

    /// Validation history of a subject, newest first
    pub async fn get_validation_results(
        &self,
        subject: &SubjectRef,
    ) -> Result<Vec<ValidationResultRecord>> {
        let subject = subject.clone();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, passed, score, flags, details, created_at
                    FROM validation_results
                    WHERE subject_kind = ?1 AND subject_id = ?2
                    ORDER BY created_at DESC, id DESC
                    "#,
                )?;

                let rows = stmt.query_map(params![subject.kind(), subject.id()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    let (id, passed, score, flags, details, created_at) = row?;
                    results.push(ValidationResultRecord {
                        id,
                        subject: subject.clone(),
                        passed,
                        score,
                        flags: serde_json::from_str(&flags)?,
                        details: serde_json::from_str(&details)?,
                        created_at,
                    });
                }
                Ok(results)
            })
            .await
    }

    pub(crate) fn has_passing_result_since_sync(
        conn: &Connection,
        subject: &SubjectRef,
        since: &str,
    ) -> Result<bool> {
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM validation_results
            WHERE subject_kind = ?1 AND subject_id = ?2 AND passed = 1 AND created_at >= ?3
            "#,
            params![subject.kind(), subject.id(), since],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Parse a text column into an enum; unknown values fail the row
pub(crate) fn column_from_row<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    row.get::<_, String>(idx)?.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Read a (kind, id) column pair into a subject reference
pub(crate) fn subject_from_row(
    row: &rusqlite::Row,
    kind_idx: usize,
    id_idx: usize,
) -> rusqlite::Result<SubjectRef> {
    let kind: String = row.get(kind_idx)?;
    let id: String = row.get(id_idx)?;
    SubjectRef::from_parts(&kind, id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(kind_idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Read an optional (kind, id) column pair
pub(crate) fn optional_subject_from_row(
    row: &rusqlite::Row,
    kind_idx: usize,
    id_idx: usize,
) -> rusqlite::Result<Option<SubjectRef>> {
    let kind: Option<String> = row.get(kind_idx)?;
    let id: Option<String> = row.get(id_idx)?;
    match (kind, id) {
        (Some(kind), Some(id)) => SubjectRef::from_parts(&kind, id).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(kind_idx, rusqlite::types::Type::Text, e.into())
        }),
        _ => Ok(None),
    }
}

#[async_trait]
impl RuleStore for Repository {
    async fn list_active(&self, rule_type: Option<RuleType>) -> Result<Vec<ValidationRule>> {
        self.db
            .execute_async(move |conn| Self::query_rules(conn, true, rule_type))
            .await
    }

    async fn list_all(&self) -> Result<Vec<ValidationRule>> {
        self.db
            .execute_async(move |conn| Self::query_rules(conn, false, None))
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<ValidationRule>> {
        let id = id.to_string();
        self.db
            .execute_async(move |conn| Self::find_rule_sync(conn, "id", &id))
            .await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ValidationRule>> {
        let name = name.to_string();
        self.db
            .execute_async(move |conn| Self::find_rule_sync(conn, "name", &name))
            .await
    }

    async fn create(&self, rule: &ValidationRule) -> Result<()> {
        let rule = rule.clone();
        let config = rule.config.params_json()?;
        let now = now_timestamp();

        self.db
            .execute_async(move |conn| {
                let inserted = conn.execute(
                    r#"
                    INSERT INTO validation_rules (id, name, rule_type, is_active, config, severity, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    "#,
                    params![
                        rule.id,
                        rule.name,
                        rule.rule_type().to_string(),
                        rule.is_active,
                        config,
                        rule.severity.to_string(),
                        now,
                    ],
                );
                match inserted {
                    Ok(_) => Ok(()),
                    // `name` is the only UNIQUE column besides the uuid key
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                    {
                        Err(DuplicateRuleName(rule.name.clone()).into())
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    async fn update(&self, rule: &ValidationRule) -> Result<bool> {
        let rule = rule.clone();
        let config = rule.config.params_json()?;
        let now = now_timestamp();

        self.db
            .execute_async(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE validation_rules
                    SET name = ?1, rule_type = ?2, is_active = ?3, config = ?4, severity = ?5, updated_at = ?6
                    WHERE id = ?7
                    "#,
                    params![
                        rule.name,
                        rule.rule_type().to_string(),
                        rule.is_active,
                        config,
                        rule.severity.to_string(),
                        now,
                        rule.id,
                    ],
                )?;
                Ok(changed == 1)
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.db
            .execute_async(move |conn| {
                let changed = conn.execute("DELETE FROM validation_rules WHERE id = ?1", [&id])?;
                Ok(changed == 1)
            })
            .await
    }
}
