//! Configuration management for nvc.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/nvc/config.json`
//! 2. Environment variable: `NVC_CONFIG_CONTENT`
//! 3. Project config: `nvc.json` in the working root
//!
//! Later sources override earlier ones field by field. Files may contain
//! `//` and `/* */` comments.

use crate::error::{ConfigError, CoreResult};
use nvc_snapshot::{CopyOptions, DEFAULT_MAX_OPEN_FILES};
use nvc_util::path::{is_single_component, resolve_in};
use nvc_util::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the metadata directory unless configured otherwise.
pub const DEFAULT_METADATA_DIR: &str = ".nvc";

/// Name of the project config file.
pub const PROJECT_CONFIG_FILE: &str = "nvc.json";

/// Environment variable holding inline JSON config.
pub const CONFIG_CONTENT_ENV: &str = "NVC_CONFIG_CONTENT";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON Schema reference.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Name of the metadata directory inside the working root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_dir: Option<String>,

    /// Restore destination, relative to the working root unless absolute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_dir: Option<PathBuf>,

    /// Extra directory names never snapshotted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,

    /// Maximum number of files copied concurrently.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_open_files: Option<usize>,

    /// Log level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from all sources and validate the result.
    ///
    /// Returns the merged config together with the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> CoreResult<(Self, Vec<PathBuf>)> {
        let global_dir = nvc_util::path::config_dir();
        let env_content = std::env::var(CONFIG_CONTENT_ENV).ok();
        Self::load_from(global_dir.as_deref(), env_content.as_deref(), project_dir).await
    }

    /// Load from explicit sources.
    pub async fn load_from(
        global_dir: Option<&Path>,
        env_content: Option<&str>,
        project_dir: Option<&Path>,
    ) -> CoreResult<(Self, Vec<PathBuf>)> {
        let mut config = Config::default();
        let mut sources = Vec::new();

        // 1. Load global config
        if let Some(global_dir) = global_dir {
            for name in &["config.json", PROJECT_CONFIG_FILE] {
                let path = global_dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        // 2. Load from environment variable
        if let Some(content) = env_content {
            config = config.merge(Self::parse_jsonc(content, "<env>")?);
        }

        // 3. Load project config
        if let Some(dir) = project_dir {
            let path = dir.join(PROJECT_CONFIG_FILE);
            if path.exists() {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        config.validate()?;
        tracing::debug!(sources = sources.len(), "Loaded configuration");
        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Merge `other` on top of `self`.
    pub fn merge(self, other: Self) -> Self {
        Self {
            schema: merge_option(self.schema, other.schema),
            metadata_dir: merge_option(self.metadata_dir, other.metadata_dir),
            restore_dir: merge_option(self.restore_dir, other.restore_dir),
            exclude: merge_list(self.exclude, other.exclude),
            max_open_files: merge_option(self.max_open_files, other.max_open_files),
            log_level: merge_option(self.log_level, other.log_level),
        }
    }

    /// Check field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.metadata_dir {
            if !is_single_component(name) {
                return Err(ConfigError::validation(format!(
                    "metadata_dir must be a single directory name, got {name:?}"
                )));
            }
        }

        for name in self.exclude.iter().flatten() {
            if !is_single_component(name) {
                return Err(ConfigError::validation(format!(
                    "exclude entries must be directory names, got {name:?}"
                )));
            }
        }

        if self.max_open_files == Some(0) {
            return Err(ConfigError::validation("max_open_files must be at least 1"));
        }

        if let Some(level) = &self.log_level {
            if LogLevel::parse(level).is_none() {
                return Err(ConfigError::validation(format!(
                    "unknown log_level {level:?}"
                )));
            }
        }

        Ok(())
    }

    /// Name of the metadata directory.
    pub fn metadata_dir_name(&self) -> &str {
        self.metadata_dir.as_deref().unwrap_or(DEFAULT_METADATA_DIR)
    }

    /// Restore destination for a working tree at `root`.
    pub fn restore_root(&self, root: &Path) -> PathBuf {
        match &self.restore_dir {
            Some(dir) => resolve_in(root, dir),
            None => root.to_path_buf(),
        }
    }

    /// Configured log level, if valid.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Copy options derived from this config.
    ///
    /// The metadata directory itself is excluded by the snapshot store.
    pub fn copy_options(&self) -> CopyOptions {
        let options = CopyOptions::new()
            .max_open_files(self.max_open_files.unwrap_or(DEFAULT_MAX_OPEN_FILES));

        self.exclude
            .iter()
            .flatten()
            .fold(options, |options, name| options.exclude(name))
    }

    fn parse_jsonc(content: &str, source: &str) -> CoreResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip JSON comments.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string {
                result.push(c);
                continue;
            }

            if c == '/' {
                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            // Keep line numbers stable for error messages
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }
}

/// Merge two Option values.
fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}

/// Merge two lists, keeping the first occurrence of each item.
fn merge_list(base: Option<Vec<String>>, other: Option<Vec<String>>) -> Option<Vec<String>> {
    match (base, other) {
        (Some(mut b), Some(o)) => {
            for item in o {
                if !b.contains(&item) {
                    b.push(item);
                }
            }
            Some(b)
        }
        (b, None) => b,
        (None, o) => o,
    }
}
