//! TOML settings loaded through `config`, plus the command line that points at them.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
