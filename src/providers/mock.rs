/*!
 * Scripted collaborators for tests and offline runs.
 *
 * - `MockSimilarity::clean()` - no matches
 * - `MockSimilarity::duplicate()` - exact duplicate of a corpus document
 * - `MockSimilarity::similar(x)` - one match with similarity `x`
 * - `MockSimilarity::failing()` - service unreachable
 * - `MockImageChecker::safe()` / `unsafe_image()` / `failing()`
 */

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::CollaboratorError;

use super::{ImageSafetyChecker, ImageSafetyReport, SimilarityChecker, SimilarityMatch, SimilarityReport};

/// Behavior mode for the similarity mock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityBehavior {
    Clean,
    Duplicate,
    Similar { similarity: f64 },
    Failing,
    /// Answers clean after a delay
    Slow { delay_ms: u64 },
}

/// Mock similarity collaborator
#[derive(Debug, Clone)]
pub struct MockSimilarity {
    behavior: SimilarityBehavior,
    /// Shared between clones
    call_count: Arc<AtomicUsize>,
}

impl MockSimilarity {
    pub fn new(behavior: SimilarityBehavior) -> Self {
        Self {
            behavior,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn clean() -> Self {
        Self::new(SimilarityBehavior::Clean)
    }

    pub fn duplicate() -> Self {
        Self::new(SimilarityBehavior::Duplicate)
    }

    pub fn similar(similarity: f64) -> Self {
        Self::new(SimilarityBehavior::Similar { similarity })
    }

    pub fn failing() -> Self {
        Self::new(SimilarityBehavior::Failing)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(SimilarityBehavior::Slow { delay_ms })
    }

    /// Number of checks performed so far
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimilarityChecker for MockSimilarity {
    async fn check_similarity(&self, _text: &str) -> Result<SimilarityReport, CollaboratorError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            SimilarityBehavior::Clean => Ok(SimilarityReport::default()),
            SimilarityBehavior::Duplicate => Ok(SimilarityReport {
                is_duplicate: true,
                matches: vec![SimilarityMatch {
                    source_id: "corpus-original".to_string(),
                    similarity: 1.0,
                }],
            }),
            SimilarityBehavior::Similar { similarity } => Ok(SimilarityReport {
                is_duplicate: false,
                matches: vec![SimilarityMatch {
                    source_id: "corpus-near".to_string(),
                    similarity,
                }],
            }),
            SimilarityBehavior::Failing => Err(CollaboratorError::Unreachable(
                "Simulated similarity outage".to_string(),
            )),
            SimilarityBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(SimilarityReport::default())
            }
        }
    }
}

/// Behavior mode for the image mock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageBehavior {
    Safe,
    Unsafe,
    Failing,
}

/// Mock image-analysis collaborator
#[derive(Debug, Clone)]
pub struct MockImageChecker {
    behavior: ImageBehavior,
    call_count: Arc<AtomicUsize>,
}

impl MockImageChecker {
    pub fn new(behavior: ImageBehavior) -> Self {
        Self {
            behavior,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn safe() -> Self {
        Self::new(ImageBehavior::Safe)
    }

    pub fn unsafe_image() -> Self {
        Self::new(ImageBehavior::Unsafe)
    }

    pub fn failing() -> Self {
        Self::new(ImageBehavior::Failing)
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSafetyChecker for MockImageChecker {
    async fn check_image_safety(&self, _url: &str) -> Result<ImageSafetyReport, CollaboratorError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            ImageBehavior::Safe => Ok(ImageSafetyReport {
                passed: true,
                score: 0.98,
                flags: vec![],
            }),
            ImageBehavior::Unsafe => Ok(ImageSafetyReport {
                passed: false,
                score: 0.1,
                flags: vec!["explicit".to_string()],
            }),
            ImageBehavior::Failing => Err(CollaboratorError::Timeout(10)),
        }
    }
}
