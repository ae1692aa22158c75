pub mod db;
pub mod error;
pub mod models;
pub mod sampling;
pub mod sensor;
pub mod settings;
pub mod sinks;
mod utils;

pub use db::Database;
pub use error::{SamplerError, SamplerResult};
pub use models::{DeviceDescriptor, RawReading, Sample};
pub use sampling::{SamplerStatus, SamplingController, SessionSummary};
pub use sensor::{ChannelSensor, SensorHandle, SimulatedRotationSensor};
pub use settings::{SamplerConfig, SettingsStore};
pub use sinks::{BroadcastNotifier, NotificationSink, PersistenceSink, SampleObserver};

/// Initializes logging (reads RUST_LOG env var, defaults to info).
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
