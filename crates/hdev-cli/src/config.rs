//! Configuration loading (spec §6 "Persistent state layout": "a single YAML
//! file under a standard config directory; environment variables override
//! file values (prefix `HDEV_`)"), grounded in `astrid-core::dirs` for
//! location resolution and `astrid-config`'s env-override-over-file pattern.

use std::env;

use hdev_core::{HdevError, HdevHome, HdevResult};
use hdev_sandbox::SandboxMode;
use serde::{Deserialize, Serialize};

fn default_model_title() -> String {
    "claude-sonnet".to_string()
}

fn default_api_name() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_output_tokens() -> u64 {
    8_192
}

fn default_context_window() -> u64 {
    200_000
}

fn default_input_price() -> f64 {
    3.0
}

fn default_output_price() -> f64 {
    15.0
}

fn default_cache_write_price() -> f64 {
    3.75
}

fn default_cache_read_price() -> f64 {
    0.3
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_sandbox_mode() -> String {
    "remember_per_resource".to_string()
}

fn default_system_prompt_tree_tokens() -> u64 {
    4_000
}

fn default_max_summary_tokens() -> u64 {
    4_096
}

/// The single YAML configuration file's shape (spec §6). Every field has a
/// default so an absent config file is equivalent to an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HdevConfig {
    /// Human-facing model name, stored on the session's [`hdev_llm::ModelSpec`].
    pub model_title: String,
    /// API identifier sent on the wire.
    pub model_api_name: String,
    /// Maximum output tokens per response.
    pub max_output_tokens: u64,
    /// Total context window, in tokens.
    pub context_window: u64,
    /// Price per million input tokens, USD.
    pub input_price_per_million: f64,
    /// Price per million output tokens, USD.
    pub output_price_per_million: f64,
    /// Price per million cache-write tokens, USD.
    pub cache_write_price_per_million: f64,
    /// Price per million cache-read tokens, USD.
    pub cache_read_price_per_million: f64,
    /// Base URL for the LLM transport.
    pub base_url: String,
    /// API key for the LLM transport. Normally supplied via `HDEV_API_KEY`
    /// rather than committed to the config file.
    pub api_key: Option<String>,
    /// One of `request_every_time`, `remember_per_resource`,
    /// `remember_all`, `allow_all` (spec §4.A table).
    pub sandbox_mode: String,
    /// Token budget for the system prompt's file-tree section.
    pub system_prompt_tree_tokens: u64,
    /// Output token budget for compaction summaries.
    pub max_summary_tokens: u64,
    /// Whether the last tool schema in each call carries an ephemeral
    /// prompt-cache breakpoint.
    pub enable_caching: bool,
}

impl Default for HdevConfig {
    fn default() -> Self {
        Self {
            model_title: default_model_title(),
            model_api_name: default_api_name(),
            max_output_tokens: default_max_output_tokens(),
            context_window: default_context_window(),
            input_price_per_million: default_input_price(),
            output_price_per_million: default_output_price(),
            cache_write_price_per_million: default_cache_write_price(),
            cache_read_price_per_million: default_cache_read_price(),
            base_url: default_base_url(),
            api_key: None,
            sandbox_mode: default_sandbox_mode(),
            system_prompt_tree_tokens: default_system_prompt_tree_tokens(),
            max_summary_tokens: default_max_summary_tokens(),
            enable_caching: true,
        }
    }
}

impl HdevConfig {
    /// Load `home.config_file()` if it exists, then apply `HDEV_*`
    /// environment variable overrides on top (spec §6: "environment
    /// variables override file values").
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not valid YAML.
    pub fn load(home: &HdevHome) -> HdevResult<Self> {
        let path = home.config_file();
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&text).map_err(|e| HdevError::Yaml(e.to_string()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("HDEV_MODEL_TITLE") {
            self.model_title = v;
        }
        if let Ok(v) = env::var("HDEV_MODEL_API_NAME") {
            self.model_api_name = v;
        }
        if let Ok(v) = env::var("HDEV_MAX_OUTPUT_TOKENS") {
            if let Ok(n) = v.parse() {
                self.max_output_tokens = n;
            }
        }
        if let Ok(v) = env::var("HDEV_CONTEXT_WINDOW") {
            if let Ok(n) = v.parse() {
                self.context_window = n;
            }
        }
        if let Ok(v) = env::var("HDEV_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = env::var("HDEV_API_KEY") {
            self.api_key = Some(v);
        }
        if let Ok(v) = env::var("HDEV_SANDBOX_MODE") {
            self.sandbox_mode = v;
        }
        if let Ok(v) = env::var("HDEV_ENABLE_CACHING") {
            if let Ok(b) = v.parse() {
                self.enable_caching = b;
            }
        }
    }

    /// Parse [`Self::sandbox_mode`] into a [`SandboxMode`], defaulting to
    /// [`SandboxMode::RememberPerResource`] on an unrecognized value.
    #[must_use]
    pub fn sandbox_mode(&self) -> SandboxMode {
        match self.sandbox_mode.as_str() {
            "request_every_time" => SandboxMode::RequestEveryTime,
            "remember_all" => SandboxMode::RememberAll,
            "allow_all" => SandboxMode::AllowAll,
            _ => SandboxMode::RememberPerResource,
        }
    }

    /// Build the [`hdev_llm::ModelSpec`] this config describes.
    #[must_use]
    pub fn model_spec(&self) -> hdev_llm::ModelSpec {
        hdev_llm::ModelSpec {
            title: self.model_title.clone(),
            api_name: self.model_api_name.clone(),
            max_output_tokens: self.max_output_tokens,
            context_window: self.context_window,
            input_price_per_million: self.input_price_per_million,
            output_price_per_million: self.output_price_per_million,
            cache_write_price_per_million: self.cache_write_price_per_million,
            cache_read_price_per_million: self.cache_read_price_per_million,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let home = HdevHome::from_path(tmp.path());
        let config = HdevConfig::load(&home).unwrap();
        assert_eq!(config.model_title, default_model_title());
        assert_eq!(config.sandbox_mode(), SandboxMode::RememberPerResource);
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let tmp = tempfile::tempdir().unwrap();
        let home = HdevHome::from_path(tmp.path());
        std::fs::write(home.config_file(), "model_title: from-file\n").unwrap();
        env::set_var("HDEV_MODEL_TITLE", "from-env");
        let config = HdevConfig::load(&home).unwrap();
        env::remove_var("HDEV_MODEL_TITLE");
        assert_eq!(config.model_title, "from-env");
    }
}
