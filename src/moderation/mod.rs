/*!
 * Moderation queue: a durable, priority-ordered backlog of works and
 * sections awaiting review, with one transition function per entry.
 */

pub mod queue;

pub use queue::{ModerationQueue, ReviewAction};
