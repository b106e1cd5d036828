//! Filesystem-rooted permission sandbox (spec §4.A).
//!
//! Every side-effecting tool operation is gated through [`Sandbox::check_permissions`]
//! before it touches the filesystem. The sandbox owns path containment, an
//! ignore-file filter for directory listings, and one of four caching
//! policies for permission decisions.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod cache;
mod ignore_filter;
mod listing;
mod prompter;
mod sandbox;

pub use cache::PermissionCache;
pub use listing::{DirEntryMetadata, ListingError};
pub use prompter::{NullPrompter, PermissionAnswer, PermissionPrompter};
pub use sandbox::{Sandbox, SandboxError, SandboxMode};
