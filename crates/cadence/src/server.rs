//! `CadenceServer` builder, maintenance driver, and notification feed.
//!
//! This is the entry point for embedding Cadence in a game server. It
//! spawns the coordinator, keeps its housekeeping running on a fixed
//! interval, and turns notifications into encoded envelopes a transport
//! can broadcast.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cadence_cycle::{spawn_coordinator, CoordinatorHandle, CycleConfig, CycleError, ListenerId};
use cadence_protocol::{unix_millis, Codec, Envelope, JsonCodec, NotificationKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::CadenceError;

/// Default cadence of the maintenance driver.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Builder for configuring and starting a Cadence server.
///
/// # Example
///
/// ```rust,no_run
/// use cadence::prelude::*;
///
/// # async fn run() -> Result<(), CadenceError> {
/// let server = CadenceServer::builder()
///     .config(CycleConfig::default())
///     .build();
/// let mut feed = server.notification_feed().await?;
/// while let Some(frame) = feed.recv().await {
///     // hand `frame` to the transport
/// #   let _ = frame;
/// }
/// # Ok(())
/// # }
/// ```
pub struct CadenceServerBuilder {
    config: CycleConfig,
    maintenance_interval: Option<Duration>,
}

impl CadenceServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: CycleConfig::default(),
            maintenance_interval: Some(DEFAULT_MAINTENANCE_INTERVAL),
        }
    }

    /// Sets the cycle configuration.
    pub fn config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how often `maintenance_tick` runs.
    pub fn maintenance_interval(mut self, every: Duration) -> Self {
        self.maintenance_interval = Some(every);
        self
    }

    /// Disables the maintenance driver. The embedding application then
    /// calls `maintenance_tick` itself.
    pub fn without_maintenance(mut self) -> Self {
        self.maintenance_interval = None;
        self
    }

    /// Spawns the coordinator (and the maintenance driver, if enabled).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> CadenceServer {
        let coordinator = spawn_coordinator(self.config);
        let maintenance = self
            .maintenance_interval
            .filter(|every| !every.is_zero())
            .map(|every| tokio::spawn(maintenance_loop(coordinator.clone(), every)));

        tracing::info!(
            maintenance_secs = ?self.maintenance_interval.map(|d| d.as_secs_f64()),
            "cadence server started"
        );
        CadenceServer {
            coordinator,
            maintenance,
        }
    }
}

impl Default for CadenceServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Cadence server.
///
/// Dropping it stops the maintenance driver; the coordinator stops once
/// every clone of its handle is dropped, or on [`shutdown`](Self::shutdown).
pub struct CadenceServer {
    coordinator: CoordinatorHandle,
    maintenance: Option<JoinHandle<()>>,
}

impl CadenceServer {
    /// Creates a new builder.
    pub fn builder() -> CadenceServerBuilder {
        CadenceServerBuilder::new()
    }

    /// The coordinator handle. Clone it into connection tasks.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Subscribes to every notification kind and returns a feed of
    /// JSON-encoded [`Envelope`]s.
    pub async fn notification_feed(&self) -> Result<NotificationFeed, CadenceError> {
        self.notification_feed_with(JsonCodec).await
    }

    /// Like [`notification_feed`](Self::notification_feed) with a custom
    /// codec.
    ///
    /// Envelopes are numbered from 1 in emission order, per feed.
    pub async fn notification_feed_with<C: Codec>(
        &self,
        codec: C,
    ) -> Result<NotificationFeed, CadenceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let seq = AtomicU64::new(0);

        let listener_id = self
            .coordinator
            .subscribe(&NotificationKind::ALL, move |notification| {
                let envelope = Envelope {
                    seq: seq.fetch_add(1, Ordering::Relaxed) + 1,
                    timestamp: unix_millis(),
                    notification: notification.clone(),
                };
                let frame = codec.encode(&envelope)?;
                tx.send(frame).map_err(|_| "notification feed closed")?;
                Ok(())
            })
            .await?;

        Ok(NotificationFeed {
            listener_id,
            coordinator: self.coordinator.clone(),
            receiver: rx,
        })
    }

    /// Stops the maintenance driver and the coordinator.
    pub fn shutdown(mut self) -> Result<(), CadenceError> {
        if let Some(task) = self.maintenance.take() {
            task.abort();
        }
        self.coordinator.shutdown()?;
        tracing::info!("cadence server stopped");
        Ok(())
    }
}

impl Drop for CadenceServer {
    fn drop(&mut self) {
        if let Some(task) = self.maintenance.take() {
            task.abort();
        }
    }
}

/// Calls `maintenance_tick` every `every` until the coordinator stops.
async fn maintenance_loop(coordinator: CoordinatorHandle, every: Duration) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match coordinator.maintenance_tick().await {
            Ok(report) => {
                tracing::debug!(
                    stale = report.stale_purged.len(),
                    queue_cleaned = report.queue_cleaned,
                    relegated = report.relegated.len(),
                    "maintenance tick"
                );
            }
            Err(CycleError::Unavailable) => {
                tracing::debug!("coordinator stopped, maintenance driver exiting");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "maintenance tick failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationFeed
// ---------------------------------------------------------------------------

/// Encoded notification envelopes, in emission order.
pub struct NotificationFeed {
    listener_id: ListenerId,
    coordinator: CoordinatorHandle,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl NotificationFeed {
    /// Waits for the next encoded envelope. Returns `None` once the
    /// coordinator has stopped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    /// Returns an envelope if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.try_recv().ok()
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// Unsubscribes from the coordinator.
    pub async fn close(self) -> Result<(), CadenceError> {
        self.coordinator.unsubscribe(self.listener_id).await?;
        Ok(())
    }
}
