use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StrataError};

/// Main configuration structure for Strata
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Per-call tier timeouts
    #[serde(default)]
    pub tiers: TierConfig,
    /// Recent-turn cache tier settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,
    /// Health check policy
    #[serde(default)]
    pub health: HealthConfig,
    /// Keyword summarizer settings
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Legacy migration settings
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Load configuration from `path`, or from the first default location that
    /// exists, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".strata").join("config.toml")),
            dirs::config_dir().map(|c| c.join("strata").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| StrataError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Timeouts applied to every tier call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Timeout for a single read or write against one tier
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Timeout for a health ping
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

impl TierConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    2000
}

fn default_health_timeout_ms() -> u64 {
    500
}

/// Recent-turn cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum turns kept per user (trimmed after every insert)
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Seconds before a cached turn expires
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum users held by the in-memory cache before the least recently
    /// active one is dropped
    #[serde(default = "default_cache_max_users")]
    pub max_users: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
            max_users: default_cache_max_users(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    20
}

fn default_cache_ttl_secs() -> u64 {
    1800
}

fn default_cache_max_users() -> usize {
    10_000
}

/// Read path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Character budget of the rendered context
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
    /// Candidates below this relevance are dropped
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,
    /// Turns requested from the cache tier
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Hits requested from the search tier
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Topics requested from the graph tier
    #[serde(default = "default_graph_limit")]
    pub graph_limit: usize,
    /// Referenced conversations fetched in full from the archive
    #[serde(default = "default_archive_fetch_limit")]
    pub archive_fetch_limit: usize,
    /// Look-back window for the archive text search fallback
    #[serde(default = "default_history_window_days")]
    pub history_window_days: i64,
    /// Topic seeds extracted from the query for the graph lookup
    #[serde(default = "default_query_topics")]
    pub query_topics: usize,
    /// Deadline for the whole read pipeline
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Per-source selection caps
    #[serde(default)]
    pub caps: SourceCaps,
    /// Relevance scoring constants
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl ContextConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_length: default_max_context_length(),
            min_relevance: default_min_relevance(),
            recent_limit: default_recent_limit(),
            search_limit: default_search_limit(),
            graph_limit: default_graph_limit(),
            archive_fetch_limit: default_archive_fetch_limit(),
            history_window_days: default_history_window_days(),
            query_topics: default_query_topics(),
            deadline_ms: default_deadline_ms(),
            caps: SourceCaps::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

fn default_max_context_length() -> usize {
    4000
}

fn default_min_relevance() -> f32 {
    0.3
}

fn default_recent_limit() -> usize {
    10
}

fn default_search_limit() -> usize {
    8
}

fn default_graph_limit() -> usize {
    6
}

fn default_archive_fetch_limit() -> usize {
    5
}

fn default_history_window_days() -> i64 {
    90
}

fn default_query_topics() -> usize {
    5
}

fn default_deadline_ms() -> u64 {
    5000
}

/// Maximum selected candidates per source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceCaps {
    #[serde(default = "default_cache_cap")]
    pub cache: usize,
    #[serde(default = "default_search_cap")]
    pub search: usize,
    #[serde(default = "default_graph_cap")]
    pub graph: usize,
    #[serde(default = "default_archive_cap")]
    pub archive: usize,
}

impl Default for SourceCaps {
    fn default() -> Self {
        Self {
            cache: default_cache_cap(),
            search: default_search_cap(),
            graph: default_graph_cap(),
            archive: default_archive_cap(),
        }
    }
}

fn default_cache_cap() -> usize {
    5
}

fn default_search_cap() -> usize {
    4
}

fn default_graph_cap() -> usize {
    3
}

fn default_archive_cap() -> usize {
    2
}

/// One time-decay step: candidates younger than `max_age_days` get `multiplier`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayStep {
    pub max_age_days: i64,
    pub multiplier: f32,
}

/// Relevance scoring constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Boost per query token shared with the candidate
    #[serde(default = "default_overlap_boost_per_token")]
    pub overlap_boost_per_token: f32,
    /// Upper bound of the total overlap boost
    #[serde(default = "default_overlap_boost_cap")]
    pub overlap_boost_cap: f32,
    /// Multiplier past the last step, and for candidates without a timestamp
    #[serde(default = "default_oldest_multiplier")]
    pub oldest_multiplier: f32,
    /// Native score of archive records, which carry no similarity of their own
    #[serde(default = "default_archive_base_score")]
    pub archive_base_score: f32,
    /// Decay steps ordered by increasing age
    #[serde(default = "default_decay_steps")]
    pub decay_steps: Vec<DecayStep>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            overlap_boost_per_token: default_overlap_boost_per_token(),
            overlap_boost_cap: default_overlap_boost_cap(),
            oldest_multiplier: default_oldest_multiplier(),
            archive_base_score: default_archive_base_score(),
            decay_steps: default_decay_steps(),
        }
    }
}

fn default_overlap_boost_per_token() -> f32 {
    0.1
}

fn default_overlap_boost_cap() -> f32 {
    0.3
}

fn default_decay_steps() -> Vec<DecayStep> {
    vec![
        DecayStep {
            max_age_days: 1,
            multiplier: 1.0,
        },
        DecayStep {
            max_age_days: 7,
            multiplier: 0.9,
        },
        DecayStep {
            max_age_days: 30,
            multiplier: 0.8,
        },
        DecayStep {
            max_age_days: 90,
            multiplier: 0.6,
        },
    ]
}

fn default_oldest_multiplier() -> f32 {
    0.4
}

fn default_archive_base_score() -> f32 {
    0.5
}

/// Health check policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Healthy tiers needed for the system to report healthy overall
    #[serde(default = "default_min_healthy_tiers")]
    pub min_healthy_tiers: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            min_healthy_tiers: default_min_healthy_tiers(),
        }
    }
}

fn default_min_healthy_tiers() -> usize {
    2
}

/// Keyword summarizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Maximum characters of a summary
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
    /// Maximum topics extracted per turn
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_summary_chars: default_max_summary_chars(),
            max_topics: default_max_topics(),
        }
    }
}

fn default_max_summary_chars() -> usize {
    150
}

fn default_max_topics() -> usize {
    5
}

/// Legacy migration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Records fetched from the legacy store per page
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Replays in flight at once
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Pause between pages
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Fraction of successful replays read back for verification
    #[serde(default = "default_verify_sample_rate")]
    pub verify_sample_rate: f64,
    /// Consecutive replay failures treated as lost connectivity
    #[serde(default = "default_abort_after_consecutive_failures")]
    pub abort_after_consecutive_failures: usize,
    /// Where run reports are written (None disables persistence)
    #[serde(default = "default_report_dir")]
    pub report_dir: Option<PathBuf>,
}

impl MigrationConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            batch_pause_ms: default_batch_pause_ms(),
            verify_sample_rate: default_verify_sample_rate(),
            abort_after_consecutive_failures: default_abort_after_consecutive_failures(),
            report_dir: default_report_dir(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_max_concurrent_batches() -> usize {
    3
}

fn default_batch_pause_ms() -> u64 {
    100
}

fn default_verify_sample_rate() -> f64 {
    0.1
}

fn default_abort_after_consecutive_failures() -> usize {
    20
}

fn default_report_dir() -> Option<PathBuf> {
    Some(
        dirs::home_dir()
            .map(|h| h.join(".strata").join("reports"))
            .unwrap_or_else(|| PathBuf::from(".strata/reports")),
    )
}
