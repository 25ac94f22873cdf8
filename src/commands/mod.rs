//! Subcommand implementations

pub mod filter;
pub mod info;
