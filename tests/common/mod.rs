/*!
 * Common test utilities for the storyguard test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use storyguard::access::{Actor, Role};
use storyguard::app_config::Config;
use storyguard::database::models::{SectionRecord, WorkRecord};
use storyguard::database::Repository;
use storyguard::providers::mock::{MockImageChecker, MockSimilarity};
use storyguard::Controller;

/// Route library logs through the test harness; `RUST_LOG=debug` to see them
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A chapter long enough to pass the default quality heuristics
pub fn sample_chapter() -> String {
    let paragraph = "Mara pulled the lantern closer and read the letter again, slowly this time, \
                     tracing each word with a fingertip as though the ink might change its mind.";
    format!("{}\n\n{}\n\n{}", paragraph, paragraph, paragraph)
}

pub fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub fn moderator() -> Actor {
    Actor::new("mod-1", Role::Moderator)
}

pub fn reader(id: &str) -> Actor {
    Actor::new(id, Role::Reader)
}

/// Owner of the seeded work
pub fn creator() -> Actor {
    Actor::new("creator-1", Role::Creator)
}

/// Insert work `w1` owned by `creator-1` with sections `s1` and `s2`
pub async fn seed_work(repo: &Repository, require_deal_approval: bool) -> Result<()> {
    let mut work = WorkRecord::new("w1", "creator-1", "The Lighthouse Letters");
    work.require_deal_approval = require_deal_approval;
    repo.insert_work(&work).await?;
    repo.insert_section(&SectionRecord::new("s1", "w1", "Chapter 1")).await?;
    repo.insert_section(&SectionRecord::new("s2", "w1", "Chapter 2")).await?;
    Ok(())
}

/// Controller over an in-memory database with scripted collaborators
pub fn controller_with(similarity: MockSimilarity, image: MockImageChecker) -> Result<Controller> {
    Ok(Controller::with_collaborators(
        Config::default(),
        Repository::new_in_memory()?,
        Arc::new(similarity),
        Arc::new(image),
    ))
}

/// Controller with clean collaborators and a seeded work
pub async fn seeded_controller() -> Result<Controller> {
    init_test_logging();
    let controller = controller_with(MockSimilarity::clean(), MockImageChecker::safe())?;
    seed_work(controller.repository(), false).await?;
    Ok(controller)
}
