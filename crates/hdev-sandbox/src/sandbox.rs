//! The sandbox itself: path containment, permission checks, file I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;

use crate::cache::PermissionCache;
use crate::ignore_filter::IgnoreFilter;
use crate::listing::{self, DirEntryMetadata, ListingError};
use crate::prompter::{PermissionAnswer, PermissionPrompter};

/// Four permission policies (spec §4.A table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SandboxMode {
    /// Always prompt, never cache.
    RequestEveryTime,
    /// Cache per `(action, resource)`; prompt on miss.
    RememberPerResource,
    /// Cache per `"action:resource"`; prompt on miss.
    RememberAll,
    /// Always allow; never prompts.
    AllowAll,
}

/// Errors from sandbox operations.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A path argument resolves outside the sandbox root.
    #[error("path {0} is outside the sandbox")]
    OutsideSandbox(String),
    /// The operator denied the action.
    #[error("permission denied for {action} on {resource}")]
    PermissionDenied {
        /// The action that was denied.
        action: String,
        /// The resource the action targeted.
        resource: String,
    },
    /// The operator chose "do something else" (spec §4.A). Carries the
    /// operator's replacement instruction once the prompter has collected
    /// it; the Agent Loop appends it to the preceding user turn.
    #[error("operator requested a different action")]
    DoSomethingElse {
        /// The operator's replacement instruction, if collected.
        alternate: Option<String>,
    },
    /// The target path does not exist.
    #[error("path {0} does not exist in the sandbox")]
    NotFound(String),
    /// The target path already exists (for operations that require it not to).
    #[error("path {0} already exists in the sandbox")]
    AlreadyExists(String),
    /// The target is not a symlink where one was required.
    #[error("path {0} is not a symlink")]
    NotASymlink(String),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Listing-specific failure.
    #[error(transparent)]
    Listing(#[from] ListingError),
}

impl SandboxError {
    /// The spec's exact operator-facing denial text (spec §7, §8 S2:
    /// `"Error: No read permission for notes.txt"`), for [`SandboxError::PermissionDenied`]
    /// only — every other variant has no such fixed phrasing and returns `None`.
    #[must_use]
    pub fn permission_message(&self) -> Option<String> {
        match self {
            SandboxError::PermissionDenied { action, resource } => {
                Some(format!("Error: No {} permission for {resource}", permission_verb(action).unwrap_or(action.as_str())))
            }
            _ => None,
        }
    }
}

/// Maps a `check_permissions` action tag to the verb spec §7/§8 uses in the
/// denial message, grounded in `heare/developer/tools.py`'s per-operation
/// `PermissionError` handlers (`read_file` → "read", `write_file` → "write",
/// `edit_file` → "read or write" since an edit both reads and overwrites).
fn permission_verb(action: &str) -> Option<&'static str> {
    match action {
        "read_file" => Some("read"),
        "write_file" => Some("write"),
        "edit_file" => Some("read or write"),
        "create_symlink" => Some("symlink"),
        "shell" => Some("shell"),
        _ => None,
    }
}

/// Root-scoped permission gate for every side-effecting file or shell
/// operation (spec §4.A).
pub struct Sandbox {
    root: PathBuf,
    mode: SandboxMode,
    cache: PermissionCache,
    ignore: IgnoreFilter,
    prompter: Arc<dyn PermissionPrompter>,
}

impl Sandbox {
    /// Construct a sandbox rooted at `root_directory`, loading ignore
    /// patterns once.
    #[must_use]
    pub fn new(root_directory: impl AsRef<Path>, mode: SandboxMode, prompter: Arc<dyn PermissionPrompter>) -> Self {
        let root = root_directory
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| root_directory.as_ref().to_path_buf());
        let ignore = IgnoreFilter::load(&root);
        Self {
            cache: PermissionCache::for_mode(mode),
            root,
            mode,
            ignore,
            prompter,
        }
    }

    /// Sandbox root (always absolute).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active caching mode.
    #[must_use]
    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    /// Resolve `relative` against the root without requiring it to exist.
    #[must_use]
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }

    /// Is `path` (absolute or root-relative) contained within the sandbox
    /// root, per lexical resolution (no `..`, no symlink escape)?
    ///
    /// Mirrors the original's `os.path.commonpath([abs_path, root]) ==
    /// root` check: it is purely lexical, run against `resolve`'s output
    /// (which does not follow symlinks), matching spec §4.A's "the check is
    /// on the lexical-resolved path, not the symlink target".
    #[must_use]
    pub fn is_in_sandbox(&self, path: &Path) -> bool {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let normalized = normalize_lexically(&abs);
        normalized.starts_with(&self.root)
    }

    /// Check permission for `(action, resource)`, prompting (and possibly
    /// caching) as directed by the active mode.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::DoSomethingElse`] if the operator chose that
    /// response; otherwise never fails (denial is communicated via `Ok(false)`
    /// to mirror the Python `check_permissions` contract, where callers
    /// decide what a denial means for their operation).
    pub async fn check_permissions(
        &self,
        action: &str,
        resource: &str,
        arguments: Option<Value>,
    ) -> Result<bool, SandboxError> {
        if self.mode == SandboxMode::AllowAll {
            return Ok(true);
        }
        if self.cache.is_allowed(action, resource) {
            return Ok(true);
        }

        self.prompter.render(action, resource, arguments.as_ref()).await;
        let answer = self
            .prompter
            .prompt(action, resource, self.mode, arguments.as_ref())
            .await?;

        let allowed = answer == PermissionAnswer::Allow;
        if allowed {
            self.cache.record_allowed(action, resource);
        }
        Ok(allowed)
    }

    /// Read a file's contents, gated by a `read_file` permission check.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OutsideSandbox`], [`SandboxError::NotFound`],
    /// [`SandboxError::PermissionDenied`], or an I/O error.
    pub async fn read_file(&self, file_path: &str) -> Result<String, SandboxError> {
        let full_path = self.root.join(file_path);
        if !self.is_in_sandbox(&full_path) {
            return Err(SandboxError::OutsideSandbox(file_path.to_string()));
        }
        if !self.check_permissions("read_file", file_path, None).await? {
            return Err(SandboxError::PermissionDenied {
                action: "read_file".to_string(),
                resource: file_path.to_string(),
            });
        }
        if !full_path.exists() {
            return Err(SandboxError::NotFound(file_path.to_string()));
        }
        Ok(tokio::fs::read_to_string(&full_path).await?)
    }

    /// Write `content` to `file_path`, creating parent directories.
    ///
    /// For an existing file, the permission arguments carry a unified diff
    /// against the new content (action `edit_file`); for a new file, they
    /// carry the full content (action `write_file`) — mirroring the
    /// original's two distinct prompts.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OutsideSandbox`], [`SandboxError::PermissionDenied`],
    /// or an I/O error.
    pub async fn write_file(&self, file_path: &str, content: &str) -> Result<(), SandboxError> {
        let full_path = self.root.join(file_path);
        if !self.is_in_sandbox(&full_path) {
            return Err(SandboxError::OutsideSandbox(file_path.to_string()));
        }

        if full_path.exists() {
            let existing = tokio::fs::read_to_string(&full_path).await.unwrap_or_default();
            let diff = similar::TextDiff::from_lines(&existing, content)
                .unified_diff()
                .context_radius(3)
                .header(file_path, file_path)
                .to_string();
            let diff_display = if diff.is_empty() { "(no changes)".to_string() } else { diff };

            if !self
                .check_permissions("edit_file", file_path, Some(json!({ "diff": diff_display })))
                .await?
            {
                return Err(SandboxError::PermissionDenied {
                    action: "edit_file".to_string(),
                    resource: file_path.to_string(),
                });
            }
        } else if !self
            .check_permissions("write_file", file_path, Some(json!({ "content": content })))
            .await?
        {
            return Err(SandboxError::PermissionDenied {
                action: "write_file".to_string(),
                resource: file_path.to_string(),
            });
        }

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;
        Ok(())
    }

    /// Create a new file; fails if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OutsideSandbox`], [`SandboxError::AlreadyExists`],
    /// [`SandboxError::PermissionDenied`], or an I/O error.
    pub async fn create_file(&self, file_path: &str, content: &str) -> Result<(), SandboxError> {
        if !self
            .check_permissions("write_file", file_path, Some(json!({ "content": content })))
            .await?
        {
            return Err(SandboxError::PermissionDenied {
                action: "write_file".to_string(),
                resource: file_path.to_string(),
            });
        }
        let full_path = self.root.join(file_path);
        if !self.is_in_sandbox(&full_path) {
            return Err(SandboxError::OutsideSandbox(file_path.to_string()));
        }
        if full_path.exists() {
            return Err(SandboxError::AlreadyExists(file_path.to_string()));
        }
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;
        Ok(())
    }

    /// Flat, sorted listing of paths under `path` (default: root),
    /// ignore-filtered, following symlinked directories.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OutsideSandbox`] or a listing I/O error.
    pub fn directory_listing(
        &self,
        path: &str,
        recursive: bool,
        limit: usize,
    ) -> Result<Vec<String>, SandboxError> {
        let target_dir = self.root.join(path);
        if !self.is_in_sandbox(&target_dir) {
            return Err(SandboxError::OutsideSandbox(path.to_string()));
        }
        Ok(listing::list_directory(&target_dir, recursive, limit, &self.ignore)?)
    }

    /// Listing with symlink metadata per entry.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OutsideSandbox`] or a listing I/O error.
    pub fn directory_listing_with_metadata(
        &self,
        path: &str,
        recursive: bool,
        limit: usize,
    ) -> Result<Vec<DirEntryMetadata>, SandboxError> {
        let target_dir = self.root.join(path);
        if !self.is_in_sandbox(&target_dir) {
            return Err(SandboxError::OutsideSandbox(path.to_string()));
        }
        Ok(listing::list_directory_with_metadata(&target_dir, recursive, limit, &self.ignore)?)
    }

    /// Whether `file_path` is a symlink.
    #[must_use]
    pub fn is_symlink(&self, file_path: &str) -> bool {
        let full_path = self.root.join(file_path);
        if !self.is_in_sandbox(&full_path) {
            return false;
        }
        full_path
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// Create a symlink at `link_path` pointing at `target_path`, permission-gated.
    ///
    /// Both absolute and relative targets are validated to resolve inside
    /// the sandbox before the link is created.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::OutsideSandbox`] or [`SandboxError::PermissionDenied`].
    pub async fn create_symlink(&self, target_path: &str, link_path: &str) -> Result<(), SandboxError> {
        if !self
            .check_permissions("create_symlink", link_path, Some(json!({ "target": target_path })))
            .await?
        {
            return Err(SandboxError::PermissionDenied {
                action: "create_symlink".to_string(),
                resource: link_path.to_string(),
            });
        }

        let full_link_path = self.root.join(link_path);
        if !self.is_in_sandbox(&full_link_path) {
            return Err(SandboxError::OutsideSandbox(link_path.to_string()));
        }

        let target = Path::new(target_path);
        if target.is_absolute() {
            if !self.is_in_sandbox(target) {
                return Err(SandboxError::OutsideSandbox(target_path.to_string()));
            }
        } else {
            let link_dir = full_link_path.parent().unwrap_or(&self.root);
            let resolved = normalize_lexically(&link_dir.join(target));
            if !resolved.starts_with(&self.root) {
                return Err(SandboxError::OutsideSandbox(target_path.to_string()));
            }
        }

        if let Some(parent) = full_link_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(target_path, &full_link_path)?;
        #[cfg(not(unix))]
        return Err(SandboxError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks are only supported on unix",
        )));
        #[cfg(unix)]
        Ok(())
    }
}

/// Collapse `.`/`..` components without touching the filesystem (unlike
/// `canonicalize`, this works for paths that don't exist yet).
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompter::NullPrompter;
    use std::sync::Arc;

    struct AllowPrompter;

    #[async_trait::async_trait]
    impl PermissionPrompter for AllowPrompter {
        async fn render(&self, _action: &str, _resource: &str, _arguments: Option<&Value>) {}
        async fn prompt(
            &self,
            _action: &str,
            _resource: &str,
            _mode: SandboxMode,
            _arguments: Option<&Value>,
        ) -> Result<PermissionAnswer, SandboxError> {
            Ok(PermissionAnswer::Allow)
        }
    }

    #[tokio::test]
    async fn allow_all_never_prompts() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter));
        assert!(sandbox.check_permissions("read_file", "x", None).await.unwrap());
    }

    #[tokio::test]
    async fn remember_per_resource_caches_after_allow() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(tmp.path(), SandboxMode::RememberPerResource, Arc::new(AllowPrompter));
        assert!(sandbox.check_permissions("read_file", "a.txt", None).await.unwrap());
        // Second check must hit cache; NullPrompter-style denial would fail this
        // if the cache weren't consulted first. AllowPrompter always allows too,
        // so assert the cache entry exists directly.
        assert!(sandbox.cache.is_allowed("read_file", "a.txt"));
    }

    #[tokio::test]
    async fn outside_sandbox_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter));
        let err = sandbox.read_file("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, SandboxError::OutsideSandbox(_)));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter));
        sandbox.write_file("notes.txt", "hello world").await.unwrap();
        let content = sandbox.read_file("notes.txt").await.unwrap();
        assert_eq!(content, "hello world");
    }

    #[tokio::test]
    async fn symlink_target_resolution_must_stay_in_sandbox() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter));
        let err = sandbox.create_symlink("../outside", "link").await.unwrap_err();
        assert!(matches!(err, SandboxError::OutsideSandbox(_)));
    }

    #[tokio::test]
    async fn reading_through_symlink_matches_target() {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter));
        sandbox.write_file("target.txt", "same bytes").await.unwrap();
        sandbox.create_symlink("target.txt", "link.txt").await.unwrap();
        let via_link = sandbox.read_file("link.txt").await.unwrap();
        let via_target = sandbox.read_file("target.txt").await.unwrap();
        assert_eq!(via_link, via_target);
    }
}
