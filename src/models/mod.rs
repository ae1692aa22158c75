pub mod device;
pub mod reading;
pub mod sample;

pub use device::DeviceDescriptor;
pub use reading::RawReading;
pub use sample::{Sample, NEUTRAL_W};

/// Record layout version stamped on every persisted row.
pub const SCHEMA_VERSION: i32 = 1;
