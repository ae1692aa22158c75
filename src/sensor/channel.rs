use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, MutexGuard,
};

use anyhow::{anyhow, Result};
use log::{debug, info};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{SamplerError, SamplerResult};
use crate::models::RawReading;

use super::{DeviceCapabilities, SensorHandle, Subscription, SubscriptionId};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

type ActiveFeed = (SubscriptionId, mpsc::Sender<RawReading>);

/// Sensor fed by the host: platform callbacks push readings in, the sampler
/// consumes them through the normal subscription.
pub struct ChannelSensor {
    capabilities: DeviceCapabilities,
    capacity: usize,
    feed: Mutex<Option<ActiveFeed>>,
    next_id: AtomicU64,
}

impl ChannelSensor {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self::with_capacity(capabilities, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capabilities: DeviceCapabilities, capacity: usize) -> Self {
        Self {
            capabilities,
            capacity: capacity.max(1),
            feed: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Non-blocking push for use from hardware callbacks. A full queue drops
    /// the reading and reports it.
    pub fn push(&self, reading: RawReading) -> SamplerResult<()> {
        let sender = self.current_sender()?;
        match sender.try_send(reading) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SamplerError::Subscription(anyhow!(
                "reading queue full, reading dropped"
            ))),
            Err(TrySendError::Closed(_)) => Err(SamplerError::SubscriptionLost),
        }
    }

    /// Waits for queue capacity instead of dropping.
    pub async fn send(&self, reading: RawReading) -> SamplerResult<()> {
        let sender = self.current_sender()?;
        sender
            .send(reading)
            .await
            .map_err(|_| SamplerError::SubscriptionLost)
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock_feed().is_some()
    }

    /// Ends delivery as if the hardware went away. The sampler sees the
    /// stream close and shuts its session down.
    pub fn disconnect(&self) {
        if let Some((id, _)) = self.lock_feed().take() {
            info!("channel sensor disconnected (subscription {})", id.0);
        }
    }

    fn current_sender(&self) -> SamplerResult<mpsc::Sender<RawReading>> {
        self.lock_feed()
            .as_ref()
            .map(|(_, sender)| sender.clone())
            .ok_or(SamplerError::NotSampling)
    }

    fn lock_feed(&self) -> MutexGuard<'_, Option<ActiveFeed>> {
        match self.feed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SensorHandle for ChannelSensor {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn subscribe(&self, rate_hz: u32) -> Result<Subscription> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, readings) = mpsc::channel(self.capacity);
        let previous = self.lock_feed().replace((id, sender));
        if let Some((old_id, _)) = previous {
            debug!("subscription {} replaced by {}", old_id.0, id.0);
        }
        debug!("channel sensor subscription {} at {} Hz", id.0, rate_hz);
        Ok(Subscription { id, readings })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut feed = self.lock_feed();
        if matches!(feed.as_ref(), Some((current, _)) if *current == id) {
            feed.take();
        }
    }
}
