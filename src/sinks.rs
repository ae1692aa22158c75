//! Collaborator interfaces the sampling core talks to.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{DeviceDescriptor, Sample};

pub const EVENT_NEW_DATA: &str = "rotation.new_data";
pub const EVENT_SYNC_REQUESTED: &str = "rotation.sync_requested";
pub const EVENT_SUBSCRIPTION_LOST: &str = "rotation.subscription_lost";
pub const EVENT_SAMPLING_STARTED: &str = "rotation.sampling_started";
pub const EVENT_SAMPLING_STOPPED: &str = "rotation.sampling_stopped";

/// Storage tables the sampler writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    RotationData,
    RotationDevice,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::RotationData => "rotation_data",
            Table::RotationDevice => "rotation_device",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    pub remove_after_sync: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remove_after_sync: true,
        }
    }
}

/// Durable storage for samples and device descriptors.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save_one(&self, device: DeviceDescriptor, table: Table) -> Result<()>;

    /// Takes ownership of the batch; the sampler keeps no copy.
    async fn save_batch(&self, samples: Vec<Sample>, table: Table) -> Result<()>;

    async fn request_sync(&self, table: Table, options: SyncOptions) -> Result<()>;
}

/// Fire-and-forget event delivery.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: &str);
}

/// Real-time consumer of accepted samples.
///
/// Runs on the sampling task for every accepted sample, so implementations
/// should return quickly.
pub trait SampleObserver: Send + Sync {
    fn on_sample(&self, sample: &Sample);
}

/// Notification sink that fans events out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn emit(&self, event: &str) {
        // No receivers is fine; notifications are best effort.
        if self.sender.send(event.to_string()).is_err() {
            debug!("no listeners for {event}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_notifier_delivers_to_every_listener() {
        let notifier = BroadcastNotifier::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.emit(EVENT_NEW_DATA);

        assert_eq!(first.recv().await.unwrap(), EVENT_NEW_DATA);
        assert_eq!(second.recv().await.unwrap(), EVENT_NEW_DATA);
    }

    #[test]
    fn emit_without_listeners_is_silent() {
        let notifier = BroadcastNotifier::new(1);
        notifier.emit(EVENT_SYNC_REQUESTED);
    }
}
