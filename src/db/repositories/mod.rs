pub mod devices;
pub mod samples;
pub mod sync_requests;

pub use sync_requests::SyncRequest;
