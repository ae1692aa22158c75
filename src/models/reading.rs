use chrono::{DateTime, Utc};

use crate::error::{SamplerError, SamplerResult};

/// One hardware event from the rotation sensor, before any filtering.
///
/// The constructor enforces the 3-or-4 axis contract so the filter never has
/// to handle any other arity.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    values: Vec<f32>,
    /// Hardware event timestamp in the sensor clock domain (monotonic, ns).
    pub event_timestamp: i64,
    pub accuracy: i32,
    /// Wall-clock time the reading reached the sampler.
    pub received_at: DateTime<Utc>,
}

impl RawReading {
    pub fn new(
        values: Vec<f32>,
        event_timestamp: i64,
        accuracy: i32,
        received_at: DateTime<Utc>,
    ) -> SamplerResult<Self> {
        match values.len() {
            3 | 4 => Ok(Self {
                values,
                event_timestamp,
                accuracy,
                received_at,
            }),
            other => Err(SamplerError::InvalidReading(other)),
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The three axes used for change detection.
    pub fn axes(&self) -> [f32; 3] {
        [self.values[0], self.values[1], self.values[2]]
    }

    /// Scalar component, present only on 4-component readings.
    pub fn w(&self) -> Option<f32> {
        self.values.get(3).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_arity() {
        let now = Utc::now();
        assert!(matches!(
            RawReading::new(vec![1.0, 2.0], 0, 0, now),
            Err(SamplerError::InvalidReading(2))
        ));
        assert!(matches!(
            RawReading::new(vec![0.0; 5], 0, 0, now),
            Err(SamplerError::InvalidReading(5))
        ));
    }

    #[test]
    fn exposes_scalar_only_for_four_components() {
        let now = Utc::now();
        let three = RawReading::new(vec![0.1, 0.2, 0.3], 7, 3, now).unwrap();
        assert_eq!(three.axes(), [0.1, 0.2, 0.3]);
        assert_eq!(three.w(), None);

        let four = RawReading::new(vec![0.1, 0.2, 0.3, 0.9], 7, 3, now).unwrap();
        assert_eq!(four.w(), Some(0.9));
    }
}
