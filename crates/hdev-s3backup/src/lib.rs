//! S3 backup and restore of a [`hdev_memory::MemoryBackend`] (spec §4.E),
//! grounded in `heare/developer/s3_backup.py`'s `S3BackupManager`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod manager;
mod store;

pub use manager::{BackupEntryError, BackupMetadata, BackupResult, BackupSummary, RestoreResult, S3BackupManager};
pub use store::{ObjectStore, RustS3Store};
