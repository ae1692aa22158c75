use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::{RawReading, Sample};
use crate::sensor::{SensorHandle, Subscription};
use crate::settings::SamplerConfig;
use crate::sinks::{NotificationSink, PersistenceSink, SampleObserver, EVENT_SUBSCRIPTION_LOST};

use super::flusher::{FlushStats, FlushWorker};
use super::state::{RateTelemetry, SamplingState};

// Set to false to silence this module's per-session logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Observer calls slower than this are reported; at a few hundred Hz a slow
/// observer eats directly into sampling throughput.
const OBSERVER_BUDGET: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEnd {
    Stopped,
    SubscriptionLost,
}

/// Counters for one Idle → Sampling → Idle cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub end: SessionEnd,
    pub readings_observed: u64,
    pub samples_accepted: u64,
    pub batches_flushed: u64,
    pub samples_flushed: u64,
    pub batches_failed: u64,
    pub samples_dropped: u64,
}

pub struct SessionContext {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub sensor: Arc<dyn SensorHandle>,
    pub subscription: Subscription,
    pub sink: Arc<dyn PersistenceSink>,
    pub notifier: Arc<dyn NotificationSink>,
    pub telemetry: Arc<RateTelemetry>,
}

pub async fn sampling_loop(
    ctx: SessionContext,
    mut config_rx: watch::Receiver<SamplerConfig>,
    cancel_token: CancellationToken,
) -> SessionSummary {
    let SessionContext {
        session_id,
        started_at,
        sensor,
        subscription,
        sink,
        notifier,
        telemetry,
    } = ctx;
    let Subscription {
        id: subscription_id,
        mut readings,
    } = subscription;

    let mut config = config_rx.borrow_and_update().clone();
    let mut state = SamplingState::new(started_at, telemetry.clone());
    let flusher = FlushWorker::spawn(sink, notifier.clone(), config.debug);

    log_info!(
        "Rotation sampling session {} active: {} samples per second, flushing every {}ms",
        session_id,
        config.rate_hz,
        config.flush_period_ms()
    );

    let end = loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break SessionEnd::Stopped,
            next = readings.recv() => {
                let Some(reading) = next else {
                    break SessionEnd::SubscriptionLost;
                };

                if config_rx.has_changed().unwrap_or(false) {
                    config = config_rx.borrow_and_update().clone();
                    log_debug!("session {} picked up new config {:?}", session_id, config);
                }
                handle_reading(&mut state, &config, &reading, &flusher);
            }
        }
    };

    sensor.unsubscribe(subscription_id);
    // Readings delivered before the stop request still count.
    let mut backlog = 0usize;
    while let Ok(reading) = readings.try_recv() {
        handle_reading(&mut state, &config, &reading, &flusher);
        backlog += 1;
    }
    if backlog > 0 {
        log_debug!("processed {} queued readings after stop", backlog);
    }
    // No readings and no observer calls past this point.
    drop(readings);

    if let Some(remaining) = state.drain_remaining() {
        log_info!(
            "Flushing {} buffered samples before ending session {}",
            remaining.len(),
            session_id
        );
        flusher.submit(remaining);
    }
    let FlushStats {
        batches_flushed,
        samples_flushed,
        batches_failed,
        samples_dropped,
    } = flusher.finish().await;
    telemetry.reset();

    if end == SessionEnd::SubscriptionLost {
        log_warn!("sensor delivery ended unexpectedly; session {} stopped", session_id);
        notifier.emit(EVENT_SUBSCRIPTION_LOST);
    }
    log_info!("Rotation sampling session {} terminated ({:?})", session_id, end);

    SessionSummary {
        session_id,
        started_at,
        stopped_at: Utc::now(),
        end,
        readings_observed: state.readings_observed(),
        samples_accepted: state.samples_accepted(),
        batches_flushed,
        samples_flushed,
        batches_failed,
        samples_dropped,
    }
}

fn handle_reading(
    state: &mut SamplingState,
    config: &SamplerConfig,
    reading: &RawReading,
    flusher: &FlushWorker,
) {
    let observer = config.sensor_observer.as_deref();
    let outcome = state.process(reading, config, |sample| notify_observer(observer, sample));
    if let Some(batch) = outcome.batch {
        if config.debug {
            log_debug!("Saving buffer of {} samples", batch.len());
        }
        flusher.submit(batch);
    }
}

/// Runs the observer with panics contained and its latency watched.
fn notify_observer(observer: Option<&dyn SampleObserver>, sample: &Sample) {
    let Some(observer) = observer else {
        return;
    };

    let started = Instant::now();
    if panic::catch_unwind(AssertUnwindSafe(|| observer.on_sample(sample))).is_err() {
        log_error!("sample observer panicked; sample kept");
    }
    let elapsed = started.elapsed();
    if elapsed > OBSERVER_BUDGET {
        log_warn!(
            "sample observer took {}us (budget {}us); sampling is throttled",
            elapsed.as_micros(),
            OBSERVER_BUDGET.as_micros()
        );
    }
}
