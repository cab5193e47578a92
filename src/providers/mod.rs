/*!
 * External collaborators consulted by the validation engine.
 *
 * This module contains the contracts and client implementations for:
 * - Similarity: duplicate and plagiarism detection over the corpus
 * - Image safety: analysis of cover/illustration images by URL
 *
 * Both are best-effort. Every call returns `Result<_, CollaboratorError>`
 * so the engine can tell "checked and failed" from "could not check".
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::errors::CollaboratorError;

pub mod http;
pub mod mock;

/// One corpus document similar to the submitted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Identifier of the matching document
    pub source_id: String,
    /// Similarity in [0, 1]
    pub similarity: f64,
}

/// Answer of the similarity collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub matches: Vec<SimilarityMatch>,
}

impl SimilarityReport {
    /// Highest similarity among the matches, 0 when there are none
    pub fn max_similarity(&self) -> f64 {
        self.matches
            .iter()
            .map(|m| m.similarity)
            .fold(0.0, f64::max)
    }
}

/// Answer of the image-analysis collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSafetyReport {
    pub passed: bool,
    /// Safety score in [0, 1], higher is safer
    pub score: f64,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Duplicate / plagiarism detection
#[async_trait]
pub trait SimilarityChecker: Send + Sync + Debug {
    async fn check_similarity(&self, text: &str) -> Result<SimilarityReport, CollaboratorError>;
}

/// Image safety analysis by URL
#[async_trait]
pub trait ImageSafetyChecker: Send + Sync + Debug {
    async fn check_image_safety(&self, url: &str) -> Result<ImageSafetyReport, CollaboratorError>;
}

/// Stand-in used when no endpoint is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl SimilarityChecker for Unconfigured {
    async fn check_similarity(&self, _text: &str) -> Result<SimilarityReport, CollaboratorError> {
        Err(CollaboratorError::NotConfigured)
    }
}

#[async_trait]
impl ImageSafetyChecker for Unconfigured {
    async fn check_image_safety(&self, _url: &str) -> Result<ImageSafetyReport, CollaboratorError> {
        Err(CollaboratorError::NotConfigured)
    }
}
