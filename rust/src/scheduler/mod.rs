//! Subframe allocator.
//!
//! Once per subframe the scheduler refreshes its timers, merges HARQ
//! feedback, replays pending retransmissions, then fills the remaining
//! symbols with new data bucket by bucket from the highest MCS down.

mod core;
mod events;
mod state;

pub use core::{HarqFeedback, SchedulerError, SubframeScheduler};
pub use events::{SchedulerEvent, SchedulerStats};
pub use state::StationState;
