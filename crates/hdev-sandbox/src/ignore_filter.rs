//! Gitignore-semantics ignore-pattern filtering for directory listings.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Loaded once at sandbox construction: `.git` plus whatever the sandbox
/// root's `.gitignore` names.
pub(crate) struct IgnoreFilter {
    spec: Gitignore,
}

impl IgnoreFilter {
    /// Build from the sandbox root. Missing `.gitignore` is not an error —
    /// `.git` alone is always ignored.
    pub(crate) fn load(root: &Path) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        builder.add_line(None, ".git").ok();
        let gitignore_path = root.join(".gitignore");
        if gitignore_path.is_file() {
            // Errors (malformed lines) are not fatal; partial patterns still apply.
            let _ = builder.add(&gitignore_path);
        }
        let spec = builder.build().unwrap_or_else(|_| Gitignore::empty());
        Self { spec }
    }

    /// Is `path` (relative to the sandbox root) ignored? `is_dir` affects
    /// directory-only patterns (trailing `/`).
    pub(crate) fn matches(&self, path: &Path, is_dir: bool) -> bool {
        self.spec.matched(path, is_dir).is_ignore()
    }
}
