//! Registry of declared tools, each owning its own concurrency semaphore.

use std::collections::HashMap;
use std::sync::Arc;

use hdev_llm::{CacheControl, CacheControlKind, ToolSchema};
use tokio::sync::Semaphore;

use crate::declaration::ToolDeclaration;
use crate::tools::{BashTool, CreateSymlinkTool, EditFileTool, ListDirectoryTool, ReadFileTool, WriteFileTool};

/// A declared tool paired with the semaphore that enforces its
/// `max_concurrency` across one dispatch batch (spec §4.G: "a semaphore
/// owned by the tool declaration").
pub struct RegisteredTool {
    pub(crate) decl: Arc<dyn ToolDeclaration>,
    /// `None` means unbounded concurrency.
    pub(crate) semaphore: Option<Arc<Semaphore>>,
}

/// Lookup table from tool name to its declaration and semaphore.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// A registry with the standard filesystem and shell tools registered
    /// (spec §4.G table: `read_file`, `write_file`, `edit_file`,
    /// `create_symlink`, plus `list_directory` and `bash`).
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(EditFileTool));
        registry.register(Arc::new(CreateSymlinkTool));
        registry.register(Arc::new(ListDirectoryTool));
        registry.register(Arc::new(BashTool));
        registry
    }

    /// Register a tool declaration, building its semaphore from
    /// `max_concurrency()`.
    pub fn register(&mut self, decl: Arc<dyn ToolDeclaration>) {
        let max_concurrency = decl.max_concurrency();
        let semaphore = if max_concurrency == usize::MAX {
            None
        } else {
            Some(Arc::new(Semaphore::new(max_concurrency)))
        };
        self.tools.insert(decl.name().to_string(), RegisteredTool { decl, semaphore });
    }

    /// Look up a registered tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Every declared tool's wire schema, the last one carrying an
    /// ephemeral cache hint when `enable_caching` is set (spec §4.G).
    #[must_use]
    pub fn all_schemas(&self, enable_caching: bool) -> Vec<ToolSchema> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        let mut schemas: Vec<ToolSchema> = names
            .into_iter()
            .map(|name| {
                let decl = &self.tools[name].decl;
                ToolSchema {
                    name: decl.name().to_string(),
                    description: decl.description().to_string(),
                    input_schema: decl.input_schema(),
                    cache_control: None,
                }
            })
            .collect();

        if enable_caching {
            if let Some(last) = schemas.last_mut() {
                last.cache_control = Some(CacheControl { kind: CacheControlKind::Ephemeral });
            }
        }
        schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_expected_tool_names() {
        let registry = ToolRegistry::with_defaults();
        for name in ["read_file", "write_file", "edit_file", "create_symlink", "list_directory", "bash"] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn write_family_is_serialized_others_are_not() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(registry.get("write_file").unwrap().semaphore.as_ref().unwrap().available_permits(), 1);
        assert_eq!(registry.get("edit_file").unwrap().semaphore.as_ref().unwrap().available_permits(), 1);
        assert_eq!(registry.get("create_symlink").unwrap().semaphore.as_ref().unwrap().available_permits(), 1);
        assert!(registry.get("read_file").unwrap().semaphore.is_none());
        assert!(registry.get("bash").unwrap().semaphore.is_none());
    }

    #[test]
    fn last_schema_gets_cache_control_when_caching_enabled() {
        let registry = ToolRegistry::with_defaults();
        let schemas = registry.all_schemas(true);
        assert!(schemas.last().unwrap().cache_control.is_some());
        for schema in &schemas[..schemas.len() - 1] {
            assert!(schema.cache_control.is_none());
        }
    }

    #[test]
    fn no_cache_control_when_caching_disabled() {
        let registry = ToolRegistry::with_defaults();
        let schemas = registry.all_schemas(false);
        assert!(schemas.iter().all(|s| s.cache_control.is_none()));
    }
}
