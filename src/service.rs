//! Periodic service lifecycle.
//!
//! Each pipeline stage is an independent task that ticks, publishes a
//! health snapshot, then sleeps for its interval or exits when the
//! supervisor posts the stop signal. A tick already in flight always runs
//! to completion; the per-operation deadlines inside it bound how long
//! shutdown can take.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::models::ServiceHealth;

/// Shared slot a service writes its latest health snapshot into; the
/// health service reads all slots when producing the heartbeat document.
pub type HealthSlot = Arc<RwLock<ServiceHealth>>;

pub fn new_health_slot(name: &str) -> HealthSlot {
    Arc::new(RwLock::new(ServiceHealth::new(name)))
}

/// A worker that advances its slice of the pipeline once per interval.
///
/// Implementations never propagate errors out of `tick`: transient
/// failures are logged and retried implicitly by the next tick.
pub trait PeriodicService: Send + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Current health snapshot, including the chain cursor the service
    /// would want restored after a restart.
    fn health(&self) -> ServiceHealth;

    /// One full iteration of the service's work.
    fn tick(&mut self) -> impl Future<Output = ()> + Send;
}

/// Spawns the run loop for one service.
pub fn spawn_service<S: PeriodicService>(
    mut service: S,
    health: HealthSlot,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(service = service.name(), "service started");
        loop {
            service.tick().await;
            *health.write().await = service.health();
            tokio::select! {
                _ = stop.changed() => {
                    info!(service = service.name(), "service stopped");
                    break;
                }
                _ = tokio::time::sleep(service.interval()) => {}
            }
        }
    })
}
