//! Command-line bridge for the steering wheel controller.
//!
//! Loads a YAML configuration, connects to the controller over a
//! TCP-exposed serial port and logs the actions the controller triggers.
//! Reconnects after device errors until interrupted.

pub mod bridge;
pub mod cli;
pub mod error;
pub mod logging;
pub mod sink;

pub use bridge::{run, serve};
pub use cli::Args;
pub use error::{Result, RunnerError};
pub use logging::init_logging;
pub use sink::LoggingActionSink;
