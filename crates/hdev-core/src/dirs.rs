//! Directory scaffolding for the runtime's persistent state (§6 "Persistent
//! state layout"): session files, memory-backend files, todos, config.

use std::io;
use std::path::{Path, PathBuf};

/// Resolved home directory for all runtime state (`$HDEV_HOME` or
/// `$HOME/.hdev/`).
#[derive(Debug, Clone)]
pub struct HdevHome {
    root: PathBuf,
}

impl HdevHome {
    /// Resolve the home directory.
    ///
    /// Checks `$HDEV_HOME` first, then falls back to `$HOME/.hdev/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$HDEV_HOME` is set but not absolute, or if
    /// neither `$HDEV_HOME` nor `$HOME` is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var("HDEV_HOME") {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "HDEV_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither HDEV_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".hdev")
        };
        Ok(Self { root })
    }

    /// Construct from an explicit path (tests, or an embedder that manages
    /// its own directory layout).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create every subdirectory this struct names, if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.todos_dir())?;
        std::fs::create_dir_all(self.memory_dir())?;
        Ok(())
    }

    /// Root of the home directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one JSON file per session id.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Path of a single session's persisted state file.
    #[must_use]
    pub fn session_file(&self, id: &crate::SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{id}.json"))
    }

    /// Directory holding one JSON file per session's todo list.
    #[must_use]
    pub fn todos_dir(&self) -> PathBuf {
        self.root.join("todos")
    }

    /// Path of a single session's todo list file.
    #[must_use]
    pub fn todo_file(&self, id: &crate::SessionId) -> PathBuf {
        self.todos_dir().join(format!("{id}.json"))
    }

    /// Default root for the filesystem memory backend.
    #[must_use]
    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    /// Path of the single YAML configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }
}
