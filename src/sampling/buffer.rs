use chrono::{DateTime, Utc};

use crate::models::Sample;

/// Accepted samples waiting for the next flush, in acceptance order.
///
/// Owned by the sampling task. Draining moves the whole `Vec` out with
/// `mem::take`, so the handoff to the flush task and the next `append` can
/// never observe a half-drained buffer.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns every buffered sample once `period_minutes` have passed since
    /// `last_flush`. An empty buffer never produces a batch.
    pub fn drain_if_due(
        &mut self,
        now: DateTime<Utc>,
        last_flush: DateTime<Utc>,
        period_minutes: f32,
    ) -> Option<Vec<Sample>> {
        let period_ms = (f64::from(period_minutes) * 60_000.0) as i64;
        if (now - last_flush).num_milliseconds() < period_ms {
            return None;
        }
        self.drain()
    }

    /// Unconditional drain used at shutdown.
    pub fn drain(&mut self) -> Option<Vec<Sample>> {
        if self.samples.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawReading;
    use chrono::Duration;

    fn sample(x: f32) -> Sample {
        let reading = RawReading::new(vec![x, 0.0, 0.0], 0, 3, Utc::now()).unwrap();
        Sample::from_reading(&reading, "device-a", None)
    }

    #[test]
    fn empty_buffer_never_yields_a_batch() {
        let mut buffer = SampleBuffer::new();
        let start = Utc::now();
        assert!(buffer
            .drain_if_due(start + Duration::minutes(10), start, 1.0)
            .is_none());
        assert!(buffer.drain().is_none());
    }

    #[test]
    fn holds_samples_until_period_elapses() {
        let mut buffer = SampleBuffer::new();
        let start = Utc::now();
        buffer.append(sample(1.0));
        buffer.append(sample(2.0));

        assert!(buffer
            .drain_if_due(start + Duration::seconds(59), start, 1.0)
            .is_none());
        assert_eq!(buffer.len(), 2);

        let batch = buffer
            .drain_if_due(start + Duration::seconds(60), start, 1.0)
            .unwrap();
        assert_eq!(batch.iter().map(|s| s.x).collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn fractional_periods_are_honoured() {
        let mut buffer = SampleBuffer::new();
        let start = Utc::now();
        buffer.append(sample(1.0));
        assert!(buffer
            .drain_if_due(start + Duration::milliseconds(29_999), start, 0.5)
            .is_none());
        assert!(buffer
            .drain_if_due(start + Duration::milliseconds(30_000), start, 0.5)
            .is_some());
    }
}
