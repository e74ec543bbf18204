pub mod api;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod series;
pub mod store;
pub mod views;

pub use error::{MonitorError, Result};
