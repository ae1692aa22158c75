use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info};
use rand::Rng;
use tokio::{
    sync::mpsc,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::models::RawReading;

use super::{
    DeviceCapabilities, SensorHandle, Subscription, SubscriptionId, TYPE_ROTATION_VECTOR,
};

const FASTEST_PERIOD: Duration = Duration::from_millis(5);
const QUEUE_CAPACITY: usize = 256;
/// rad/s around the z axis
const ANGULAR_VELOCITY: f64 = 0.5;
const NOISE: f32 = 0.002;
const ACCURACY_HIGH: i32 = 3;

/// Synthetic rotation vector source: a slow spin around z with a bit of
/// noise, delivered as 4-component quaternions.
pub struct SimulatedRotationSensor {
    capabilities: DeviceCapabilities,
    subscriptions: Mutex<HashMap<SubscriptionId, CancellationToken>>,
    next_id: AtomicU64,
}

impl SimulatedRotationSensor {
    pub fn new() -> Self {
        Self {
            capabilities: Self::default_capabilities(),
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn default_capabilities() -> DeviceCapabilities {
        DeviceCapabilities {
            name: "Simulated Rotation Vector".into(),
            vendor: "rotation-sampler".into(),
            version: 1,
            sensor_type: TYPE_ROTATION_VECTOR,
            max_range: 1.0,
            resolution: 5.96e-8,
            power: 0.0,
            min_delay_us: 5_000,
        }
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, HashMap<SubscriptionId, CancellationToken>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SimulatedRotationSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorHandle for SimulatedRotationSensor {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn subscribe(&self, rate_hz: u32) -> Result<Subscription> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("simulated sensor needs a tokio runtime")?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let period = period_for(rate_hz);

        let (tx, readings) = mpsc::channel(QUEUE_CAPACITY);
        let token = CancellationToken::new();
        self.lock_subscriptions().insert(id, token.clone());

        runtime.spawn(emit_readings(tx, period, token));
        info!("simulated rotation sensor delivering every {:?}", period);

        Ok(Subscription { id, readings })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(token) = self.lock_subscriptions().remove(&id) {
            token.cancel();
        }
    }
}

/// Delivery period for `rate_hz`; 0 and rates beyond the hardware's fastest
/// period both clamp to `FASTEST_PERIOD`.
fn period_for(rate_hz: u32) -> Duration {
    if rate_hz == 0 {
        return FASTEST_PERIOD;
    }
    Duration::from_micros(1_000_000 / u64::from(rate_hz)).max(FASTEST_PERIOD)
}

async fn emit_readings(
    tx: mpsc::Sender<RawReading>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let origin = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed = origin.elapsed();
                let values = rotation_at(elapsed.as_secs_f64());
                let event_ns = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
                let Ok(reading) = RawReading::new(values, event_ns, ACCURACY_HIGH, Utc::now()) else {
                    continue;
                };
                if tx.try_send(reading).is_err() && tx.is_closed() {
                    break;
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
    debug!("simulated sensor delivery ended");
}

fn rotation_at(t: f64) -> Vec<f32> {
    let half = (ANGULAR_VELOCITY * t) / 2.0;
    let mut rng = rand::thread_rng();
    let mut jitter = || rng.gen_range(-NOISE..=NOISE);
    vec![
        jitter(),
        jitter(),
        half.sin() as f32 + jitter(),
        half.cos() as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_quaternions_until_unsubscribed() {
        let sensor = SimulatedRotationSensor::new();
        let mut sub = sensor.subscribe(100).unwrap();

        let first = sub.readings.recv().await.unwrap();
        assert_eq!(first.values().len(), 4);
        assert!(first.w().is_some());

        sensor.unsubscribe(sub.id);
        // Drain whatever was queued before cancellation, then the stream ends.
        while sub.readings.recv().await.is_some() {}
    }

    #[test]
    fn period_clamps_to_fastest_delivery() {
        assert_eq!(period_for(0), FASTEST_PERIOD);
        assert_eq!(period_for(2_000_000), FASTEST_PERIOD);
        assert_eq!(period_for(u32::MAX), FASTEST_PERIOD);
        assert_eq!(period_for(100), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn extreme_rate_still_delivers() {
        let sensor = SimulatedRotationSensor::new();
        let mut sub = sensor.subscribe(2_000_000).unwrap();
        assert!(sub.readings.recv().await.is_some());
        assert!(sub.readings.recv().await.is_some());
        sensor.unsubscribe(sub.id);
    }

    #[test]
    fn rotation_stays_near_unit_length() {
        let v = rotation_at(3.0);
        let norm: f32 = v.iter().map(|c| c * c).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
