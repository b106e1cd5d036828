//! Subcommand implementations (spec §6 "CLI surface").

pub mod chat;
pub mod gauth;
pub mod memory_server;
pub mod migrate_memory;
