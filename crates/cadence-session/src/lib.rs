//! Player sessions and handles for Cadence.
//!
//! This crate owns everything the server knows about an individual player
//! during an epoch:
//!
//! 1. **Handles**: unique display names ([`HandleRegistry`])
//! 2. **Sessions**: connection linkage, lifecycle state, and performance
//!    history ([`SessionStore`])
//! 3. **Relegation**: the bottom-performer rule that decides when a
//!    player has done badly for too long ([`RelegationPolicy`])
//!
//! The registry and the store never call each other. The lifecycle
//! coordinator keeps them in step.
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (cadence-cycle)  ← drives sessions through the match cycle
//!     ↕
//! Queue (cadence-queue)        ← reads and updates session state
//!     ↕
//! Session layer (this crate)   ← per-player records and handles
//!     ↕
//! Protocol (cadence-protocol)  ← SessionId, ConnectionId, MatchId
//! ```

mod error;
mod handles;
mod policy;
mod session;
mod store;

pub use error::{HandleRejection, SessionError};
pub use handles::{is_valid_handle, HandleRecord, HandleRegistry, HandleStats};
pub use policy::RelegationPolicy;
pub use session::{
    LifecycleState, PerformanceEntry, RelegationRecord, Session, SessionConfig, SessionStats,
};
pub use store::SessionStore;
