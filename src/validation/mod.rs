/*!
 * Content validation.
 *
 * # Architecture
 *
 * - `safety`: Scans text against the active safety rules
 * - `quality`: Structural heuristics (length, paragraphs, repetition, caps)
 * - `engine`: Runs the requested checks, consults collaborators, scores
 *   and optionally records the verdict
 */

pub mod engine;
pub mod quality;
pub mod safety;

// Re-export main types
pub use engine::{ValidationContent, ValidationEngine, ValidationOptions, ValidationResult};
pub use quality::{QualityReport, QualityThresholds};
pub use safety::{SafetyMatch, SafetyOutcome};
