//! Hierarchical key/value memory store (spec §4.C): the abstract
//! [`MemoryBackend`] contract, a local-filesystem implementation, an HTTP
//! client implementation, and an HTTP server exposing the same contract.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod backend;
pub mod filesystem;
pub mod http_client;
pub mod http_server;
pub mod path;
pub mod shapes;

pub use backend::MemoryBackend;
pub use filesystem::FilesystemMemoryBackend;
pub use http_client::HttpMemoryBackend;
pub use http_server::router;
pub use shapes::{EntryMetadata, HealthResult, ReadResult, SearchHit, StoredEntry, TreeResult, WriteResult};
