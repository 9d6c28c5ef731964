//! Server startup helpers

mod logging;
mod replay;
mod shutdown;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use replay::{ReplayStats, ServiceRecordHandler, decode_line, replay_events};
pub use shutdown::{ShutdownSignal, spawn_signal_listener};
