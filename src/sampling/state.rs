use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{RawReading, Sample};
use crate::settings::SamplerConfig;

use super::buffer::SampleBuffer;
use super::filter::{FilterDecision, SampleFilter};

const RATE_WINDOW_MS: i64 = 1000;

/// Per-second throughput published by the sampling task and read by the
/// controller. Read-only telemetry; never consulted by the filter.
#[derive(Debug, Default)]
pub struct RateTelemetry {
    observed: AtomicU32,
    accepted: AtomicU32,
}

impl RateTelemetry {
    /// Raw readings that reached the sampler in the last full second.
    pub fn observed(&self) -> u32 {
        self.observed.load(Ordering::Relaxed)
    }

    /// Readings that passed both gates in the last full second.
    pub fn accepted(&self) -> u32 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.observed.store(0, Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
    }
}

/// One-second counting window.
#[derive(Debug, Default)]
struct RateWindow {
    started_at: Option<DateTime<Utc>>,
    count: u32,
}

impl RateWindow {
    /// Closes the window when a second has passed, returning its count.
    fn roll(&mut self, now: DateTime<Utc>) -> Option<u32> {
        match self.started_at {
            Some(start) if (now - start).num_milliseconds() < RATE_WINDOW_MS => None,
            _ => {
                let finished = std::mem::take(&mut self.count);
                self.started_at = Some(now);
                Some(finished)
            }
        }
    }

    fn bump(&mut self) {
        self.count = self.count.saturating_add(1);
    }
}

#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub decision: Option<FilterDecision>,
    /// A full buffer drain, ready to be handed to persistence.
    pub batch: Option<Vec<Sample>>,
}

impl ProcessOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self.decision, Some(FilterDecision::Accept))
    }
}

/// Everything the sampling task tracks between readings.
pub struct SamplingState {
    filter: SampleFilter,
    last_flush: DateTime<Utc>,
    buffer: SampleBuffer,
    observed_window: RateWindow,
    accepted_window: RateWindow,
    telemetry: Arc<RateTelemetry>,
    readings_observed: u64,
    samples_accepted: u64,
}

impl SamplingState {
    pub fn new(started_at: DateTime<Utc>, telemetry: Arc<RateTelemetry>) -> Self {
        Self {
            filter: SampleFilter::new(),
            last_flush: started_at,
            buffer: SampleBuffer::new(),
            observed_window: RateWindow::default(),
            accepted_window: RateWindow::default(),
            telemetry,
            readings_observed: 0,
            samples_accepted: 0,
        }
    }

    /// Runs one reading through the gates. On acceptance the sample is shown
    /// to `observe` first, then buffered, then the flush policy is checked.
    pub fn process<F>(&mut self, reading: &RawReading, config: &SamplerConfig, observe: F) -> ProcessOutcome
    where
        F: FnOnce(&Sample),
    {
        let now = reading.received_at;
        self.roll_windows(now);
        self.observed_window.bump();
        self.readings_observed += 1;

        let decision = self.filter.evaluate(reading, config.rate_hz, config.threshold);
        if !decision.is_accept() {
            return ProcessOutcome {
                decision: Some(decision),
                batch: None,
            };
        }

        self.filter.record_accepted(reading);
        self.accepted_window.bump();
        self.samples_accepted += 1;

        let sample = Sample::from_reading(reading, &config.device_id, config.label.as_deref());
        observe(&sample);
        self.buffer.append(sample);

        let batch = self
            .buffer
            .drain_if_due(now, self.last_flush, config.flush_period_minutes);
        if batch.is_some() {
            self.last_flush = now;
        }

        ProcessOutcome {
            decision: Some(decision),
            batch,
        }
    }

    /// Whatever is left in the buffer, for the final flush at shutdown.
    pub fn drain_remaining(&mut self) -> Option<Vec<Sample>> {
        self.buffer.drain()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn last_flush(&self) -> DateTime<Utc> {
        self.last_flush
    }

    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.filter.last_accepted_at()
    }

    pub fn readings_observed(&self) -> u64 {
        self.readings_observed
    }

    pub fn samples_accepted(&self) -> u64 {
        self.samples_accepted
    }

    fn roll_windows(&mut self, now: DateTime<Utc>) {
        if let Some(count) = self.observed_window.roll(now) {
            self.telemetry.observed.store(count, Ordering::Relaxed);
        }
        if let Some(count) = self.accepted_window.roll(now) {
            self.telemetry.accepted.store(count, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn origin() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn reading(ms: i64, x: f32) -> RawReading {
        RawReading::new(vec![x, 0.0, 0.0], ms, 3, origin() + Duration::milliseconds(ms)).unwrap()
    }

    fn config(rate_hz: u32, threshold: f64, flush_period_minutes: f32) -> SamplerConfig {
        SamplerConfig {
            rate_hz,
            threshold,
            flush_period_minutes,
            device_id: "device-a".into(),
            ..SamplerConfig::default()
        }
    }

    #[test]
    fn nothing_flushes_before_the_first_period() {
        let mut state = SamplingState::new(origin(), Arc::default());
        let cfg = config(0, 0.0, 1.0);
        for ms in (0..59_000).step_by(1000) {
            assert!(state.process(&reading(ms, ms as f32), &cfg, |_| {}).batch.is_none());
        }
        assert_eq!(state.buffered(), 59);
    }

    #[test]
    fn flushed_batches_cover_every_sample_once_in_order() {
        let mut state = SamplingState::new(origin(), Arc::default());
        let cfg = config(5, 0.0, 0.5);
        let mut flushed = Vec::new();
        let mut accepted = Vec::new();

        // 100 s of readings every 100 ms; the rate gate keeps every other one.
        for step in 0..1000 {
            let ms = step * 100;
            let outcome = state.process(&reading(ms, step as f32), &cfg, |s| accepted.push(s.x));
            if let Some(batch) = outcome.batch {
                flushed.extend(batch.into_iter().map(|s| s.x));
            }
        }
        let flushes_before_shutdown = flushed.len();
        if let Some(rest) = state.drain_remaining() {
            flushed.extend(rest.into_iter().map(|s| s.x));
        }

        assert_eq!(accepted.len(), 500);
        assert!(flushes_before_shutdown > 0 && flushes_before_shutdown < 500);
        assert_eq!(flushed, accepted);
        assert_eq!(state.samples_accepted(), 500);
        assert_eq!(state.readings_observed(), 1000);
    }

    #[test]
    fn flush_clock_advances_only_on_flush() {
        let mut state = SamplingState::new(origin(), Arc::default());
        let cfg = config(0, 0.0, 1.0);
        state.process(&reading(30_000, 1.0), &cfg, |_| {});
        assert_eq!(state.last_flush(), origin());

        let outcome = state.process(&reading(60_000, 2.0), &cfg, |_| {});
        assert_eq!(outcome.batch.map(|b| b.len()), Some(2));
        assert_eq!(state.last_flush(), origin() + Duration::milliseconds(60_000));
    }

    #[test]
    fn observer_sees_sample_before_it_is_buffered() {
        let mut state = SamplingState::new(origin(), Arc::default());
        let cfg = config(0, 0.0, 1.0);
        let mut seen = None;
        let outcome = state.process(&reading(0, 0.75), &cfg, |s| seen = Some(s.clone()));
        assert!(outcome.accepted());
        assert_eq!(seen.map(|s| s.x), Some(0.75));
        assert_eq!(state.buffered(), 1);
    }

    #[test]
    fn label_is_taken_at_acceptance_time() {
        let mut state = SamplingState::new(origin(), Arc::default());
        let mut cfg = config(0, 0.0, 10.0);
        cfg.label = Some("sitting".into());
        state.process(&reading(0, 1.0), &cfg, |_| {});
        cfg.label = Some("walking".into());
        state.process(&reading(10, 2.0), &cfg, |_| {});

        let batch = state.drain_remaining().unwrap();
        assert_eq!(batch[0].label.as_deref(), Some("sitting"));
        assert_eq!(batch[1].label.as_deref(), Some("walking"));
    }

    #[test]
    fn config_swap_keeps_rate_gate_anchor() {
        let mut state = SamplingState::new(origin(), Arc::default());
        let mut cfg = config(5, 0.0, 10.0);
        assert!(state.process(&reading(0, 1.0), &cfg, |_| {}).accepted());

        cfg.threshold = 0.01;
        let outcome = state.process(&reading(50, 5.0), &cfg, |_| {});
        assert_eq!(outcome.decision, Some(FilterDecision::RejectRate));
        assert_eq!(state.last_accepted_at(), Some(origin()));
    }

    #[test]
    fn rate_counters_publish_at_window_boundaries() {
        let telemetry = Arc::new(RateTelemetry::default());
        let mut state = SamplingState::new(origin(), telemetry.clone());
        let cfg = config(5, 0.0, 10.0);

        // 20 readings in the first second, 50 ms apart.
        for step in 0..20 {
            state.process(&reading(step * 50, step as f32), &cfg, |_| {});
        }
        // Nothing is published until a reading lands in the next window.
        assert_eq!(telemetry.observed(), 0);

        state.process(&reading(1000, 100.0), &cfg, |_| {});
        assert_eq!(telemetry.observed(), 20);
        assert_eq!(telemetry.accepted(), 5);
    }
}
