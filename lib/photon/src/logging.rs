//! Logging bootstrap and re-exports. Everything downstream logs through
//! `photon::logging` so the slog machinery stays in one place.

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::{Build, Config, LoggerConfig};
use std::fmt;
use std::path::Path;

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Drain, Logger};
pub use sloggers::types::Severity;

#[derive(Debug)]
pub enum InitError {
    Config(serdeconv::Error),
    Build(sloggers::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InitError::Config(err) => write!(f, "logger config error: {}", err),
            InitError::Build(err) => write!(f, "logger build error: {}", err),
        }
    }
}

impl std::error::Error for InitError {}

/// Builds the root logger from a sloggers TOML config file.
pub fn init_from_file<P: AsRef<Path>>(path: P) -> Result<Logger, InitError> {
    let config: LoggerConfig = serdeconv::from_toml_file(path).map_err(InitError::Config)?;
    config.build_logger().map_err(InitError::Build)
}

/// Terminal logger on stderr, used when no logging config file is present.
pub fn init_terminal(level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);
    builder
        .build()
        .expect("terminal logger construction failed")
}

/// Logger that swallows everything. Test fixtures use this.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
