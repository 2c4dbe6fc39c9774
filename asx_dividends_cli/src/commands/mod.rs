//! CLI subcommand implementations.

pub mod export;
pub mod init_db;
pub mod run;
pub mod serve;
