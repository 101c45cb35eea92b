//! Shared vocabulary for Cadence.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//!
//! - **Identity** ([`SessionId`], [`ConnectionId`], [`MatchId`]): who and
//!   what an operation is about.
//! - **Cycle state** ([`Phase`], [`MatchRecord`], [`ParticipantResult`]):
//!   the global phase and the match currently being played.
//! - **Notifications** ([`Notification`], [`NotificationKind`],
//!   [`Envelope`]): what the coordinator tells observers about.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how notifications become
//!   bytes for whatever transport broadcasts them.
//!
//! # Architecture
//!
//! This crate has no runtime behavior. It sits below every other crate:
//!
//! ```text
//! cadence-cycle → cadence-queue → cadence-session → cadence-protocol
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    unix_millis, ConnectionId, Envelope, MatchId, MatchRecord, Notification,
    NotificationKind, ParticipantResult, Phase, SessionId,
};
