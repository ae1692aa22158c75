//! Acceptance gates applied to every raw reading.

use chrono::{DateTime, Utc};

use crate::models::RawReading;

/// Fraction of the nominal period a reading must trail the last accepted
/// one by. Readings up to 10% early are admitted to absorb scheduler jitter;
/// without it a 5 Hz target lands closer to 4 Hz on real hardware.
pub const RATE_TOLERANCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Arrived too soon after the last accepted reading.
    RejectRate,
    /// x, y and z all moved less than the threshold.
    RejectThreshold,
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// What the gates compare against: the last *accepted* reading only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleFilter {
    last_values: Option<[f32; 3]>,
    last_accepted_at: Option<DateTime<Utc>>,
}

impl SampleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last_accepted_at
    }

    pub fn last_values(&self) -> Option<[f32; 3]> {
        self.last_values
    }

    /// Runs the rate gate then the threshold gate. Does not mutate anything;
    /// call [`SampleFilter::record_accepted`] when the reading is kept.
    pub fn evaluate(&self, reading: &RawReading, rate_hz: u32, threshold: f64) -> FilterDecision {
        if !self.passes_rate_gate(reading.received_at, rate_hz) {
            return FilterDecision::RejectRate;
        }
        if !self.passes_threshold_gate(reading.axes(), threshold) {
            return FilterDecision::RejectThreshold;
        }
        FilterDecision::Accept
    }

    /// Overwrites the comparison axes with the reading (no averaging) and
    /// stamps the acceptance time.
    pub fn record_accepted(&mut self, reading: &RawReading) {
        self.last_values = Some(reading.axes());
        self.last_accepted_at = Some(reading.received_at);
    }

    fn passes_rate_gate(&self, now: DateTime<Utc>, rate_hz: u32) -> bool {
        if rate_hz == 0 {
            return true;
        }
        let Some(last) = self.last_accepted_at else {
            return true;
        };
        let elapsed_ms = (now - last).num_milliseconds() as f64;
        let min_gap_ms = RATE_TOLERANCE * (1000.0 / f64::from(rate_hz));
        elapsed_ms >= min_gap_ms
    }

    fn passes_threshold_gate(&self, axes: [f32; 3], threshold: f64) -> bool {
        if threshold <= 0.0 {
            return true;
        }
        let Some(last) = self.last_values else {
            return true;
        };
        // Rejected only when every axis is strictly below; NaN deltas count as movement.
        !axes
            .iter()
            .zip(last.iter())
            .all(|(current, previous)| f64::from((current - previous).abs()) < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64, values: &[f32]) -> RawReading {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap();
        RawReading::new(values.to_vec(), ms * 1_000_000, 3, ts).unwrap()
    }

    fn accept(filter: &mut SampleFilter, reading: &RawReading, rate_hz: u32, threshold: f64) -> bool {
        let decision = filter.evaluate(reading, rate_hz, threshold);
        if decision.is_accept() {
            filter.record_accepted(reading);
        }
        decision.is_accept()
    }

    #[test]
    fn first_reading_always_passes() {
        let filter = SampleFilter::new();
        assert_eq!(
            filter.evaluate(&at(0, &[0.0, 0.0, 0.0]), 5, 0.5),
            FilterDecision::Accept
        );
    }

    #[test]
    fn rate_gate_rejects_readings_inside_tolerance_window() {
        let mut filter = SampleFilter::new();
        assert!(accept(&mut filter, &at(0, &[1.0, 1.0, 1.0]), 5, 0.0));
        // 50 ms < 0.9 * 200 ms
        assert_eq!(
            filter.evaluate(&at(50, &[2.0, 2.0, 2.0]), 5, 0.0),
            FilterDecision::RejectRate
        );
        // 150 ms is still inside the 180 ms bound
        assert_eq!(
            filter.evaluate(&at(150, &[2.0, 2.0, 2.0]), 5, 0.0),
            FilterDecision::RejectRate
        );
    }

    #[test]
    fn rate_gate_admits_slightly_early_readings() {
        let mut filter = SampleFilter::new();
        assert!(accept(&mut filter, &at(0, &[1.0, 1.0, 1.0]), 5, 0.0));
        assert!(accept(&mut filter, &at(180, &[1.0, 1.0, 1.0]), 5, 0.0));
        assert!(accept(&mut filter, &at(370, &[1.0, 1.0, 1.0]), 5, 0.0));
    }

    #[test]
    fn unconstrained_rate_accepts_back_to_back_readings() {
        let mut filter = SampleFilter::new();
        for _ in 0..3 {
            assert!(accept(&mut filter, &at(0, &[1.0, 1.0, 1.0]), 0, 0.0));
        }
    }

    #[test]
    fn threshold_gate_needs_one_axis_to_move() {
        let mut filter = SampleFilter::new();
        assert!(accept(&mut filter, &at(0, &[1.0, 1.0, 1.0]), 0, 0.1));
        assert_eq!(
            filter.evaluate(&at(10, &[1.05, 1.05, 1.05]), 0, 0.1),
            FilterDecision::RejectThreshold
        );
        assert!(accept(&mut filter, &at(20, &[1.2, 1.0, 1.0]), 0, 0.1));
    }

    #[test]
    fn nan_baseline_does_not_stall_the_threshold_gate() {
        let mut filter = SampleFilter::new();
        assert!(accept(&mut filter, &at(0, &[f32::NAN, 0.0, 0.0]), 0, 0.1));
        assert_eq!(
            filter.evaluate(&at(10, &[1.0, 0.0, 0.0]), 0, 0.1),
            FilterDecision::Accept
        );

        let mut filter = SampleFilter::new();
        assert!(accept(&mut filter, &at(0, &[f32::NAN; 3]), 0, 0.1));
        assert!(accept(&mut filter, &at(10, &[0.0, 0.0, 0.0]), 0, 0.1));
        assert_eq!(
            filter.evaluate(&at(20, &[0.01, 0.0, 0.0]), 0, 0.1),
            FilterDecision::RejectThreshold
        );
    }

    #[test]
    fn threshold_gate_ignores_scalar_component() {
        let mut filter = SampleFilter::new();
        assert!(accept(&mut filter, &at(0, &[1.0, 1.0, 1.0, 0.0]), 0, 0.1));
        assert_eq!(
            filter.evaluate(&at(10, &[1.0, 1.0, 1.0, 1.0]), 0, 0.1),
            FilterDecision::RejectThreshold
        );
    }

    #[test]
    fn rejected_readings_do_not_move_the_baseline() {
        let mut filter = SampleFilter::new();
        let first = at(0, &[1.0, 1.0, 1.0]);
        assert!(accept(&mut filter, &first, 5, 0.1));

        // Small drifts are rejected and must not become the new reference,
        // otherwise a slow drift would never be recorded.
        assert!(!accept(&mut filter, &at(200, &[1.06, 1.0, 1.0]), 5, 0.1));
        assert_eq!(filter.last_values(), Some([1.0, 1.0, 1.0]));
        assert_eq!(filter.last_accepted_at(), Some(first.received_at));

        assert!(accept(&mut filter, &at(400, &[1.12, 1.0, 1.0]), 5, 0.1));
    }

    #[test]
    fn rate_gate_uses_wall_clock_gap() {
        let mut filter = SampleFilter::new();
        let first = at(0, &[0.0, 0.0, 0.0]);
        assert!(accept(&mut filter, &first, 1, 0.0));
        let mut later = at(0, &[0.0, 0.0, 0.0]);
        later.received_at = first.received_at + Duration::milliseconds(899);
        assert_eq!(filter.evaluate(&later, 1, 0.0), FilterDecision::RejectRate);
        later.received_at = first.received_at + Duration::milliseconds(900);
        assert_eq!(filter.evaluate(&later, 1, 0.0), FilterDecision::Accept);
    }
}
