//! `hdev gauth` (spec §6 "CLI surface"): Google OAuth token plumbing for the
//! `gmail`/`calendar` tool integrations. Explicitly out of scope (spec §1
//! "Explicitly out of scope: ... Google OAuth token plumbing") — kept as a
//! named, cleanly failing subcommand so the external CLI surface table is
//! fully represented, the same way `astrid-cli` stubs its deferred-phase
//! subcommands rather than omitting them from `--help`.

use anyhow::{bail, Result};

/// Always fails with a clear "not implemented" message.
pub fn run(action: &str, service: &str) -> Result<()> {
    bail!("gauth {action} {service}: Google OAuth plumbing is out of scope for this runtime");
}
