pub mod monitor;

pub use monitor::{router, start_server, AppState};
