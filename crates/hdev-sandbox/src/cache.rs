//! Permission-cache storage, one variant per [`crate::SandboxMode`].
//!
//! Only affirmative decisions are ever cached (spec §3, "Permission
//! Sandbox"). Reads after a cache hit are lock-free: [`dashmap::DashMap`]
//! takes a striped lock only on the shard being touched, matching §5's
//! "internal mutex; cached affirmatives only; reads lock-free after hit".

use dashmap::{DashMap, DashSet};

/// Backing store for cached permission decisions.
///
/// `PerResource` and `All` correspond to `REMEMBER_PER_RESOURCE` and
/// `REMEMBER_ALL`; `REQUEST_EVERY_TIME` and `ALLOW_ALL` need no cache at all.
#[derive(Debug, Default)]
pub enum PermissionCache {
    /// No caching; every check re-prompts (or, for `ALLOW_ALL`, is handled
    /// before the cache is ever consulted).
    #[default]
    None,
    /// `action -> resource -> true`.
    PerResource(DashMap<String, DashSet<String>>),
    /// `"action:resource" -> true`.
    All(DashSet<String>),
}

impl PermissionCache {
    /// Build the cache variant appropriate for a mode.
    #[must_use]
    pub fn for_mode(mode: super::SandboxMode) -> Self {
        use super::SandboxMode::{AllowAll, RememberAll, RememberPerResource, RequestEveryTime};
        match mode {
            RememberPerResource => Self::PerResource(DashMap::new()),
            RememberAll => Self::All(DashSet::new()),
            RequestEveryTime | AllowAll => Self::None,
        }
    }

    /// Has this `(action, resource)` pair previously been granted?
    #[must_use]
    pub fn is_allowed(&self, action: &str, resource: &str) -> bool {
        match self {
            Self::None => false,
            Self::PerResource(map) => map
                .get(action)
                .map(|resources| resources.contains(resource))
                .unwrap_or(false),
            Self::All(set) => set.contains(&format!("{action}:{resource}")),
        }
    }

    /// Record an affirmative decision.
    pub fn record_allowed(&self, action: &str, resource: &str) {
        match self {
            Self::None => {}
            Self::PerResource(map) => {
                map.entry(action.to_string())
                    .or_default()
                    .insert(resource.to_string());
            }
            Self::All(set) => {
                set.insert(format!("{action}:{resource}"));
            }
        }
    }
}
