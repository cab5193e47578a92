/*!
 * Quality-assessment batch processing.
 *
 * - `processor`: drains pending jobs in bounded batches with per-job
 *   failure isolation and retry bookkeeping
 * - `scheduler`: local polling loop that triggers the processor
 */

pub mod processor;
pub mod scheduler;

pub use processor::{Assessor, BatchOutcome, BatchProcessor};
pub use scheduler::{Scheduler, TickSummary};
