//! Matchmaking queue for Cadence.
//!
//! A single strict-FIFO waiting list. Players who want to play join the
//! back; when an intermission ends the coordinator takes a cohort from the
//! front. Finished players go to the back again, unless the relegation
//! check catches them first.
//!
//! # Key types
//!
//! - [`MatchmakingQueue`]: the queue itself
//! - [`QueueConfig`]: capacity, cohort bounds, cycle length for estimates
//! - [`QueueRejection`]: why an enqueue was refused
//! - [`RequeueOutcome`]: what happened to each finisher after a match

mod config;
mod error;
mod queue;

pub use config::QueueConfig;
pub use error::QueueRejection;
pub use queue::{
    MatchmakingQueue, QueueEntryView, QueueStats, QueueStatus, RequeueFailure,
    RequeueFailureReason, RequeueOutcome,
};
