pub mod connection;
pub mod helpers;
pub mod migrations;
pub mod repositories;
mod sink;

pub use connection::Database;
pub use repositories::SyncRequest;
