//! Configuration for the indexing daemon.
//!
//! Layered loading: defaults, then an optional `lci.toml` next to the
//! project root, then `LCI_`-prefixed environment variables with double
//! underscores separating nesting levels:
//!
//! - `LCI_INDEXING__WORKERS=8` sets `indexing.workers`
//! - `LCI_WATCHER__DEBOUNCE_MS=500` sets `watcher.debounce_ms`
//!
//! The daemon core assumes a validated configuration object; [`Settings::validate`]
//! runs once at startup and any violation is fatal.

use crate::error::IndexError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "lci.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Absolute path of the project to index.
    pub project_root: PathBuf,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Include globs; empty means every supported file.
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude globs, applied before gitignore rules.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Extra gitignore-style pattern lines from configuration.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Respect the project's `.gitignore`.
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Worker pool size. Zero means CPU count minus one, floor one.
    #[serde(default)]
    pub workers: usize,

    /// Files larger than this many bytes are skipped, not parsed partially.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Hard cap on registered files.
    #[serde(default = "default_max_file_count")]
    pub max_file_count: usize,

    #[serde(default = "default_false")]
    pub follow_symlinks: bool,

    /// Overall indexing deadline in seconds.
    #[serde(default = "default_index_timeout")]
    pub index_timeout_secs: u64,

    /// Per-file parse ceiling in seconds.
    #[serde(default = "default_parse_timeout")]
    pub parse_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Debounce window per path in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    /// Approximate in-memory index ceiling in bytes. Breaching it defers
    /// new paths and triggers eviction down to the low-water mark.
    #[serde(default = "default_memory_ceiling")]
    pub memory_ceiling_bytes: usize,

    /// Lock acquisition deadline in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Failures on one index type before it is considered unhealthy and
    /// searches degrade around it.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

/// Weights for the layered matchers. Layers do not stack: a (query, name)
/// pair contributes the maximum matching layer only.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ScoringConfig {
    #[serde(default = "default_w_exact")]
    pub exact: f32,
    #[serde(default = "default_w_substring")]
    pub substring: f32,
    #[serde(default = "default_w_annotation")]
    pub annotation: f32,
    #[serde(default = "default_w_fuzzy")]
    pub fuzzy: f32,
    #[serde(default = "default_w_stemming")]
    pub stemming: f32,
    #[serde(default = "default_w_name_split")]
    pub name_split: f32,
    #[serde(default = "default_w_abbreviation")]
    pub abbreviation: f32,
    /// Minimum edit-distance ratio for the fuzzy layer.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
}

/// File-type and symbol-presence adjustments applied after lexical scoring.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct RankingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_code_boost")]
    pub code_boost: f32,
    #[serde(default = "default_doc_penalty")]
    pub doc_penalty: f32,
    #[serde(default = "default_config_boost")]
    pub config_boost: f32,
    #[serde(default = "default_non_symbol_penalty")]
    pub non_symbol_penalty: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter, e.g. "warn" or "info".
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_exclude() -> Vec<String> {
    vec![
        "target/**".to_string(),
        "node_modules/**".to_string(),
        ".git/**".to_string(),
    ]
}
fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}
fn default_max_file_count() -> usize {
    200_000
}
fn default_index_timeout() -> u64 {
    120
}
fn default_parse_timeout() -> u64 {
    5
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_memory_ceiling() -> usize {
    512 * 1024 * 1024
}
fn default_lock_timeout_ms() -> u64 {
    5_000
}
fn default_unhealthy_threshold() -> u32 {
    5
}
fn default_w_exact() -> f32 {
    1.00
}
fn default_w_substring() -> f32 {
    0.90
}
fn default_w_annotation() -> f32 {
    0.85
}
fn default_w_fuzzy() -> f32 {
    0.70
}
fn default_w_stemming() -> f32 {
    0.55
}
fn default_w_name_split() -> f32 {
    0.40
}
fn default_w_abbreviation() -> f32 {
    0.25
}
fn default_fuzzy_threshold() -> f32 {
    0.7
}
fn default_code_boost() -> f32 {
    50.0
}
fn default_doc_penalty() -> f32 {
    -20.0
}
fn default_config_boost() -> f32 {
    10.0
}
fn default_non_symbol_penalty() -> f32 {
    -30.0
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: default_exclude(),
            ignore_patterns: Vec::new(),
            use_gitignore: true,
            workers: 0,
            max_file_size: default_max_file_size(),
            max_file_count: default_max_file_count(),
            follow_symlinks: false,
            index_timeout_secs: default_index_timeout(),
            parse_timeout_secs: default_parse_timeout(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory_ceiling_bytes: default_memory_ceiling(),
            lock_timeout_ms: default_lock_timeout_ms(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            exact: default_w_exact(),
            substring: default_w_substring(),
            annotation: default_w_annotation(),
            fuzzy: default_w_fuzzy(),
            stemming: default_w_stemming(),
            name_split: default_w_name_split(),
            abbreviation: default_w_abbreviation(),
            fuzzy_threshold: default_fuzzy_threshold(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_boost: default_code_boost(),
            doc_penalty: default_doc_penalty(),
            config_boost: default_config_boost(),
            non_symbol_penalty: default_non_symbol_penalty(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Defaults rooted at the given project directory.
    pub fn for_root(project_root: PathBuf) -> Self {
        Self {
            project_root,
            indexing: IndexingConfig::default(),
            watcher: WatcherConfig::default(),
            limits: LimitsConfig::default(),
            scoring: ScoringConfig::default(),
            ranking: RankingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration layered over defaults for the given root.
    pub fn load(project_root: PathBuf) -> Result<Self, IndexError> {
        let config_path = project_root.join(CONFIG_FILE);

        Figment::new()
            .merge(Serialized::defaults(Settings::for_root(project_root)))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("LCI_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| IndexError::ConfigInvalid {
                reason: e.to_string(),
            })
    }

    /// Check bounds and ranges. Called once at startup; any violation is
    /// fatal per the error taxonomy.
    pub fn validate(&self) -> Result<(), IndexError> {
        let fail = |reason: String| Err(IndexError::ConfigInvalid { reason });

        if !self.project_root.is_absolute() {
            return fail(format!(
                "project_root must be absolute, got '{}'",
                self.project_root.display()
            ));
        }
        if !self.project_root.is_dir() {
            return fail(format!(
                "project_root '{}' is not a directory",
                self.project_root.display()
            ));
        }
        if self.indexing.max_file_size == 0 {
            return fail("indexing.max_file_size must be positive".into());
        }
        if self.indexing.max_file_count == 0 {
            return fail("indexing.max_file_count must be positive".into());
        }
        if self.limits.memory_ceiling_bytes == 0 {
            return fail("limits.memory_ceiling_bytes must be positive".into());
        }
        if self.limits.lock_timeout_ms == 0 {
            return fail("limits.lock_timeout_ms must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.scoring.fuzzy_threshold) {
            return fail("scoring.fuzzy_threshold must be within 0.0..=1.0".into());
        }
        for (name, w) in [
            ("exact", self.scoring.exact),
            ("substring", self.scoring.substring),
            ("annotation", self.scoring.annotation),
            ("fuzzy", self.scoring.fuzzy),
            ("stemming", self.scoring.stemming),
            ("name_split", self.scoring.name_split),
            ("abbreviation", self.scoring.abbreviation),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return fail(format!("scoring.{name} must be within 0.0..=1.0"));
            }
        }
        Ok(())
    }

    /// Effective worker pool size: configured value, or CPU−1 with a floor
    /// of one.
    pub fn effective_workers(&self) -> usize {
        if self.indexing.workers > 0 {
            self.indexing.workers
        } else {
            num_cpus::get().saturating_sub(1).max(1)
        }
    }
}
