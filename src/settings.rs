use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::PathBuf,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use uuid::Uuid;

use crate::error::{SamplerError, SamplerResult};
use crate::sinks::SampleObserver;

/// Session configuration for the rotation sampler.
///
/// Passed to `SamplingController::start` and held per session; nothing here
/// is process-global.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerConfig {
    /// Real-time observer of accepted samples. Never serialised.
    #[serde(skip)]
    pub sensor_observer: Option<Arc<dyn SampleObserver>>,

    /// Target samples per second. 0 = as fast as the hardware delivers.
    pub rate_hz: u32,

    /// Minutes between flushes of the sample buffer.
    pub flush_period_minutes: f32,

    /// Consecutive samples whose x, y and z all change by less than this
    /// are dropped. 0 disables the check.
    pub threshold: f64,

    /// Session tag applied to each sample when it is accepted.
    pub label: Option<String>,

    pub device_id: String,
    pub debug: bool,
    pub enabled: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sensor_observer: None,
            rate_hz: 5,
            flush_period_minutes: 1.0,
            threshold: 0.0,
            label: None,
            device_id: Uuid::new_v4().to_string(),
            debug: false,
            enabled: true,
        }
    }
}

impl fmt::Debug for SamplerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerConfig")
            .field("sensor_observer", &self.sensor_observer.is_some())
            .field("rate_hz", &self.rate_hz)
            .field("flush_period_minutes", &self.flush_period_minutes)
            .field("threshold", &self.threshold)
            .field("label", &self.label)
            .field("device_id", &self.device_id)
            .field("debug", &self.debug)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SamplerConfig {
    pub fn with_observer(mut self, observer: Arc<dyn SampleObserver>) -> Self {
        self.sensor_observer = Some(observer);
        self
    }

    pub fn validate(&self) -> SamplerResult<()> {
        if !self.flush_period_minutes.is_finite() || self.flush_period_minutes <= 0.0 {
            return Err(SamplerError::InvalidConfig(format!(
                "flush_period_minutes must be > 0, got {}",
                self.flush_period_minutes
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(SamplerError::InvalidConfig(format!(
                "threshold must be >= 0, got {}",
                self.threshold
            )));
        }
        if self.device_id.trim().is_empty() {
            return Err(SamplerError::InvalidConfig("device_id must not be empty".into()));
        }
        Ok(())
    }

    /// Flush period in milliseconds.
    pub fn flush_period_ms(&self) -> i64 {
        (f64::from(self.flush_period_minutes) * 60_000.0) as i64
    }

    /// Subscription period in microseconds requested from the sensor.
    pub fn sampling_period_us(&self) -> u32 {
        if self.rate_hz > 0 {
            1_000_000 / self.rate_hz
        } else {
            0
        }
    }

    /// Field-level merge used when a running session gets a new config.
    ///
    /// Only the tunables move over; `device_id` stays fixed for the lifetime
    /// of the session so every record of a session carries the same id.
    pub fn replace_with(&mut self, other: &SamplerConfig) {
        self.sensor_observer = other.sensor_observer.clone();
        self.rate_hz = other.rate_hz;
        self.flush_period_minutes = other.flush_period_minutes;
        self.threshold = other.threshold;
        self.label = other.label.clone();
        self.debug = other.debug;
        self.enabled = other.enabled;
    }
}

/// JSON-backed store for the sampler configuration.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SamplerConfig>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?
        } else {
            SamplerConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn config(&self) -> SamplerConfig {
        self.read().clone()
    }

    pub fn update(&self, config: SamplerConfig) -> Result<()> {
        config.validate().map_err(anyhow::Error::new)?;
        let mut guard = self.write();
        *guard = config;
        self.persist(&guard)
    }

    fn persist(&self, data: &SamplerConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, SamplerConfig> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, SamplerConfig> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
