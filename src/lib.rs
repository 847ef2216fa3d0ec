pub mod config;
pub mod logging;
pub mod release;
pub mod report;
pub mod snapshot;
pub mod status;
