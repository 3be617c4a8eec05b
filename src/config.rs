//! Project configuration module.
//!
//! Handles loading, validating, and merging `bsw.toml`. Every setting has a
//! stock default, so a project with the conventional layout needs no config
//! file at all:
//!
//! ```text
//! my-site/
//! ├── bsw.toml                 # Optional
//! ├── pages/                   # Page sources (*.html, *.htm)
//! │   ├── index.html
//! │   └── blog/
//! │       └── first-post.html
//! ├── templates/
//! │   ├── base.html            # Required
//! │   ├── post.html            # Selected with <!-- template = "post.html" -->
//! │   ├── includes/            # Fragments for <!-- include("nav.html") -->
//! │   │   └── nav.html
//! │   └── static/              # Template assets → build/static/
//! ├── static/                  # Site assets → build/static/
//! └── build/                   # Output
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! pages_dir = "pages"
//! templates_dir = "templates"
//! includes_dir = "includes"      # relative to templates_dir
//! static_dir = "static"
//! output_dir = "build"
//! page_extensions = ["html", "htm"]
//!
//! [serve]
//! interface = "127.0.0.1"
//! port = 8000
//!
//! [processing]
//! max_processes = 4              # omit for auto = CPU cores
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project config file in the project root.
pub const CONFIG_FILENAME: &str = "bsw.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `bsw.toml`.
///
/// Directory settings are relative to the project root; resolve them with
/// [`SiteConfig::paths`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory holding page sources.
    pub pages_dir: String,
    /// Directory holding templates. `base.html` must exist here.
    pub templates_dir: String,
    /// Include fragments, relative to `templates_dir`.
    pub includes_dir: String,
    /// Site assets merged into `<output>/static`.
    pub static_dir: String,
    /// Where rendered pages are written.
    pub output_dir: String,
    /// File extensions (without the dot) that mark a file as a page.
    pub page_extensions: Vec<String>,
    /// Development server settings.
    pub serve: ServeConfig,
    /// Parallel rendering settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            pages_dir: "pages".to_string(),
            templates_dir: "templates".to_string(),
            includes_dir: "includes".to_string(),
            static_dir: "static".to_string(),
            output_dir: "build".to_string(),
            page_extensions: vec!["html".to_string(), "htm".to_string()],
            serve: ServeConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs = [
            ("pages_dir", &self.pages_dir),
            ("templates_dir", &self.templates_dir),
            ("includes_dir", &self.includes_dir),
            ("static_dir", &self.static_dir),
            ("output_dir", &self.output_dir),
        ];
        for (key, value) in dirs {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.page_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "page_extensions must not be empty".into(),
            ));
        }
        if let Some(ext) = self
            .page_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(ConfigError::Validation(format!(
                "page_extensions entries must be non-empty and without a leading dot, got {ext:?}"
            )));
        }
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("serve.port must be non-zero".into()));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve every directory setting against the project root.
    pub fn paths(&self, root: &Path) -> SitePaths {
        let templates = root.join(&self.templates_dir);
        SitePaths {
            pages: root.join(&self.pages_dir),
            includes: templates.join(&self.includes_dir),
            template_static: templates.join("static"),
            templates,
            site_static: root.join(&self.static_dir),
            output: root.join(&self.output_dir),
        }
    }
}

/// Absolute (root-joined) locations of everything a build touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub pages: PathBuf,
    pub templates: PathBuf,
    pub includes: PathBuf,
    pub template_static: PathBuf,
    pub site_static: PathBuf,
    pub output: PathBuf,
}

/// Development server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    /// Interface to bind on.
    pub interface: String,
    /// Port to listen on. The next few ports are tried if it is busy.
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `bsw.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `bsw.toml` in the project root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `bsw.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# bsw configuration
# =================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.
# Directories are relative to the project root (where this file lives).

# Page sources. Every matching file under this directory is rendered to the
# same relative path under output_dir.
pages_dir = "pages"

# Templates. templates_dir/base.html is required; pages pick another one with
#   <!-- template = "post.html" -->
templates_dir = "templates"

# Include fragments, relative to templates_dir, referenced with
#   <!-- include("nav.html") -->
includes_dir = "includes"

# Site assets. Merged into output_dir/static after templates_dir/static.
# Existing files are never overwritten.
static_dir = "static"

# Rendered output.
output_dir = "build"

# Extensions (without the dot) that identify page sources.
page_extensions = ["html", "htm"]

# ---------------------------------------------------------------------------
# Development server (bsw serve)
# ---------------------------------------------------------------------------
[serve]
interface = "127.0.0.1"
# If the port is busy the next few ports are tried.
port = 8000

# ---------------------------------------------------------------------------
# Parallel rendering
# ---------------------------------------------------------------------------
[processing]
# Maximum render workers. Omit for one per CPU core; larger values are
# clamped to the core count.
# max_processes = 4
"##
}
