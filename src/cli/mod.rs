//! Command-line surface of the difftrace binary.

pub mod config;
pub mod error;
pub mod report;

pub use config::CliConfig;
pub use error::CliError;
