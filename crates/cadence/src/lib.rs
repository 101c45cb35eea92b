//! # Cadence
//!
//! Recurring match-cycle coordination for shared-world multiplayer games.
//!
//! Cadence decides when matches start and end, who plays in them, and who
//! is relegated for sustained poor performance. Wall-clock timers drive
//! the cycle; player input only decides who is queued:
//!
//! ```text
//! ServerStart → Intermission ⇄ ActiveMatch      (daily: ServerReset → ServerStart)
//! ```
//!
//! The transport stays outside: a gateway forwards connects, disconnects,
//! handle claims, and queue joins to the [`CoordinatorHandle`](prelude::CoordinatorHandle),
//! and broadcasts the envelopes from a [`NotificationFeed`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cadence::prelude::*;
//!
//! # async fn run() -> Result<(), CadenceError> {
//! let server = CadenceServer::builder().build();
//! let cycle = server.coordinator();
//!
//! let session = cycle.connect(ConnectionId(1)).await?;
//! cycle.claim_handle(session.clone(), "nova").await?;
//! let position = cycle.join_queue(session).await?;
//! # let _ = position;
//! # Ok(())
//! # }
//! ```

mod error;
mod server;
pub mod telemetry;

pub use error::CadenceError;
pub use server::{
    CadenceServer, CadenceServerBuilder, NotificationFeed, DEFAULT_MAINTENANCE_INTERVAL,
};

pub use cadence_cycle as cycle;
pub use cadence_protocol as protocol;
pub use cadence_queue as queue;
pub use cadence_session as session;
pub use cadence_timer as timer;

/// Everything an embedding server usually needs.
pub mod prelude {
    pub use crate::{CadenceError, CadenceServer, CadenceServerBuilder, NotificationFeed};
    pub use cadence_cycle::{
        CoordinatorHandle, CycleConfig, CycleError, CycleSnapshot, ListenerId,
        MaintenanceReport, RecordOutcome,
    };
    pub use cadence_protocol::{
        Codec, ConnectionId, Envelope, JsonCodec, MatchId, MatchRecord, Notification,
        NotificationKind, ParticipantResult, Phase, SessionId,
    };
    pub use cadence_queue::QueueRejection;
    pub use cadence_session::{HandleRejection, LifecycleState, RelegationPolicy};
}
