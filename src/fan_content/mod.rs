/*!
 * Community content: fan translations and audiobooks of a section.
 *
 * Variants compete for the (section, kind, language) slot. Readers vote on
 * them, the aggregator keeps rolling averages on the variant row, and the
 * default shown to readers is assigned explicitly. When a work requires
 * creator approval, a submission waits on a revenue-share deal first.
 */

pub mod deals;
pub mod rating;
pub mod variants;

pub use deals::{DealAction, DealService};
pub use rating::{RatingAggregator, Ratings};
pub use variants::{VariantCatalog, VariantSubmission};
