/*!
 * SQLite persistence for the moderation pipeline.
 *
 * This module provides storage for:
 * - Validation rules (the rule store behind the rule cache)
 * - Works and sections with their publish status
 * - Moderation queue entries and validation results
 * - Quality-assessment jobs
 * - Fan variants, votes and revenue-share deals
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use repository::{JobCounts, QueueCounts, Repository, ReviewApplied};
