pub mod buffer;
pub mod controller;
pub mod descriptor;
pub mod filter;
pub mod flusher;
pub mod loop_worker;
pub mod state;

pub use buffer::SampleBuffer;
pub use controller::{SamplerStatus, SamplingController};
pub use filter::{FilterDecision, SampleFilter, RATE_TOLERANCE};
pub use loop_worker::{SessionEnd, SessionSummary};
pub use state::{RateTelemetry, SamplingState};
