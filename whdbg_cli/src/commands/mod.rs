//! CLI subcommands

pub mod codes;
pub mod config;
pub mod listen;
