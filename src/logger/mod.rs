//! Global `tracing` subscriber with a filter that can be swapped once settings load.
//! See `bin/session_demo.rs` for a binary that drives it.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
