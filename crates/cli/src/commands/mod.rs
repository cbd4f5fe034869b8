//! Subcommand implementations

pub mod composite;
pub mod correlate;
pub mod detect;
pub mod forecast;
pub mod scan;
