//! CLI subcommands.

pub mod config;
pub mod cursor;
pub mod health;
pub mod timeline;
