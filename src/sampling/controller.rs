use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{SamplerError, SamplerResult};
use crate::sensor::SensorHandle;
use crate::settings::SamplerConfig;
use crate::sinks::{
    NotificationSink, PersistenceSink, SyncOptions, Table, EVENT_SAMPLING_STARTED,
    EVENT_SAMPLING_STOPPED, EVENT_SYNC_REQUESTED,
};

use super::descriptor::{describe_sensor, persist_descriptor};
use super::loop_worker::{sampling_loop, SessionContext, SessionSummary};
use super::state::RateTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SamplerStatus {
    Idle,
    Sampling,
}

struct ActiveSession {
    id: String,
    handle: Option<JoinHandle<SessionSummary>>,
    cancel_token: CancellationToken,
    config_tx: watch::Sender<SamplerConfig>,
}

impl ActiveSession {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn finish(mut self) -> SamplerResult<SessionSummary> {
        self.cancel_token.cancel();
        let handle = self.handle.take().ok_or(SamplerError::NotSampling)?;
        Ok(handle.await?)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        // The loop still drains and flushes on its own after cancellation.
        self.cancel_token.cancel();
    }
}

/// Entry point for hosts: start/stop sampling, relabel, request sync, read
/// throughput.
///
/// Each started session runs on its own tokio task. The controller talks to
/// it through a cancellation token and a config watch channel only, so the
/// sampling state never leaves that task.
pub struct SamplingController {
    sensor: Option<Arc<dyn SensorHandle>>,
    sink: Arc<dyn PersistenceSink>,
    notifier: Arc<dyn NotificationSink>,
    telemetry: Arc<RateTelemetry>,
    session: Mutex<Option<ActiveSession>>,
}

impl SamplingController {
    pub fn new(
        sensor: Option<Arc<dyn SensorHandle>>,
        sink: Arc<dyn PersistenceSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            sensor,
            sink,
            notifier,
            telemetry: Arc::new(RateTelemetry::default()),
            session: Mutex::new(None),
        }
    }

    pub async fn start(&self, config: SamplerConfig) -> SamplerResult<()> {
        let started_at = Utc::now();
        let descriptor =
            match describe_sensor(self.sensor.as_deref(), &config.device_id, started_at) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    warn!("This device doesn't have a rotation sensor!");
                    return Err(err);
                }
            };
        config.validate()?;
        let sensor = self
            .sensor
            .clone()
            .ok_or(SamplerError::NoHardwareAvailable)?;

        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(ActiveSession::is_running) {
            return Err(SamplerError::AlreadySampling);
        }
        if let Some(stale) = guard.take() {
            // Previous session ended on its own (lost subscription).
            let stale_id = stale.id.clone();
            match stale.finish().await {
                Ok(summary) => info!(
                    "Reaped ended session {}: {} samples accepted",
                    summary.session_id, summary.samples_accepted
                ),
                Err(err) => warn!("ended session {stale_id} failed: {err}"),
            }
        }

        let subscription = sensor
            .subscribe(config.rate_hz)
            .map_err(SamplerError::Subscription)?;
        info!(
            "Subscribed to rotation sensor, period {}us",
            config.sampling_period_us()
        );

        persist_descriptor(self.sink.as_ref(), descriptor).await;

        let session_id = Uuid::new_v4().to_string();
        let cancel_token = CancellationToken::new();
        let (config_tx, config_rx) = watch::channel(config);

        let ctx = SessionContext {
            session_id: session_id.clone(),
            started_at,
            sensor,
            subscription,
            sink: self.sink.clone(),
            notifier: self.notifier.clone(),
            telemetry: self.telemetry.clone(),
        };
        let handle = tokio::spawn(sampling_loop(ctx, config_rx, cancel_token.clone()));

        *guard = Some(ActiveSession {
            id: session_id.clone(),
            handle: Some(handle),
            cancel_token,
            config_tx,
        });
        drop(guard);

        info!("Rotation sampling started (session {session_id})");
        self.notifier.emit(EVENT_SAMPLING_STARTED);
        Ok(())
    }

    /// Stops the session and waits until its buffer has been flushed.
    ///
    /// Also collects a session that already ended because the sensor went
    /// away.
    pub async fn stop(&self) -> SamplerResult<SessionSummary> {
        let session = self
            .session
            .lock()
            .await
            .take()
            .ok_or(SamplerError::NotSampling)?;

        let summary = session.finish().await?;
        info!(
            "Rotation sampling stopped (session {}): {} readings, {} accepted, {} flushed, {} dropped",
            summary.session_id,
            summary.readings_observed,
            summary.samples_accepted,
            summary.samples_flushed,
            summary.samples_dropped
        );
        self.notifier.emit(EVENT_SAMPLING_STOPPED);
        Ok(summary)
    }

    /// Tags every sample accepted from now on.
    pub async fn set_label(&self, label: Option<String>) -> SamplerResult<()> {
        let guard = self.session.lock().await;
        let session = running(&guard)?;
        session.config_tx.send_modify(|config| config.label = label);
        Ok(())
    }

    /// Swaps the tunables of the running session. Timing state and buffered
    /// samples are untouched; the new values apply from the next reading.
    pub async fn replace_config(&self, config: SamplerConfig) -> SamplerResult<()> {
        config.validate()?;
        let guard = self.session.lock().await;
        let session = running(&guard)?;
        session
            .config_tx
            .send_modify(|current| current.replace_with(&config));
        Ok(())
    }

    /// Queues upstream sync of samples (removed once synced) and device
    /// snapshots (kept).
    pub async fn request_sync(&self) -> SamplerResult<()> {
        self.sink
            .request_sync(Table::RotationData, SyncOptions::default())
            .await
            .map_err(SamplerError::Persistence)?;
        self.sink
            .request_sync(
                Table::RotationDevice,
                SyncOptions {
                    remove_after_sync: false,
                },
            )
            .await
            .map_err(SamplerError::Persistence)?;
        self.notifier.emit(EVENT_SYNC_REQUESTED);
        Ok(())
    }

    pub async fn status(&self) -> SamplerStatus {
        let guard = self.session.lock().await;
        if guard.as_ref().is_some_and(ActiveSession::is_running) {
            SamplerStatus::Sampling
        } else {
            SamplerStatus::Idle
        }
    }

    /// Config currently applied by the running session.
    pub async fn active_config(&self) -> Option<SamplerConfig> {
        let guard = self.session.lock().await;
        running(&guard)
            .ok()
            .map(|session| session.config_tx.borrow().clone())
    }

    /// Readings per second reaching the sampler, accepted or not.
    pub fn current_rate(&self) -> u32 {
        self.telemetry.observed()
    }

    /// Samples per second passing both gates.
    pub fn accepted_rate(&self) -> u32 {
        self.telemetry.accepted()
    }
}

fn running(session: &Option<ActiveSession>) -> SamplerResult<&ActiveSession> {
    session
        .as_ref()
        .filter(|session| session.is_running())
        .ok_or(SamplerError::NotSampling)
}
