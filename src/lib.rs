pub mod config;
pub mod coordinator;
pub mod errors;
pub mod logging;
pub mod poller;
pub mod store;
pub mod transport;
pub mod ui;
pub mod upload;
