//! Configuration loading and typed config structures for the kernel.
//!
//! The canonical configuration lives in a YAML file loaded once at startup.
//! This module defines strongly-typed structs that mirror the YAML
//! structure and provides a loader that reads the file; structural
//! validation of the calendar tables happens in
//! [`Calendar::new`](crate::calendar::Calendar::new), which consumes the
//! [`CalendarSpec`] section.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sundial_types::{Season, TimeBlock};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level kernel configuration.
///
/// All fields have defaults, so an empty document is a valid configuration
/// describing a 12-month, 30-day, 24-hour world.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KernelConfig {
    /// Calendar shape and boundary tables.
    #[serde(default)]
    pub calendar: CalendarSpec,

    /// Scheduler limits.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Async work dispatcher tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Action-category to game-minutes cost table, supplied by the
    /// command-handling layer.
    #[serde(default)]
    pub action_costs: ActionCosts,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,
}

impl KernelConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for infrastructure URLs:
    /// - `NATS_URL` overrides `infrastructure.nats_url`
    /// - `DATABASE_URL` overrides `infrastructure.postgres_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// A season boundary: the season beginning on a given month and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SeasonStartSpec {
    /// The season that begins at this boundary.
    pub season: Season,
    /// 1-based start month.
    pub month: u32,
    /// 1-based start day within the month.
    pub day: u32,
}

/// A time-of-day block span over hours of the day.
///
/// `end_hour` is exclusive and must equal the next block's `start_hour`;
/// a block whose end is numerically before its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeBlockSpec {
    /// The block covering this span.
    pub block: TimeBlock,
    /// 0-based start hour (inclusive).
    pub start_hour: u32,
    /// 0-based end hour (exclusive).
    pub end_hour: u32,
}

/// Calendar shape and boundary tables, as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarSpec {
    /// Minutes in one hour.
    #[serde(default = "default_minutes_per_hour")]
    pub minutes_per_hour: u64,

    /// Hours in one day.
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: u64,

    /// Days in each month, in month order; the length of this list is the
    /// number of months in a year.
    #[serde(default = "default_days_per_month")]
    pub days_per_month: Vec<u64>,

    /// Season boundary table.
    #[serde(default = "default_season_starts")]
    pub season_starts: Vec<SeasonStartSpec>,

    /// Time-of-day block boundary table.
    #[serde(default = "default_time_blocks")]
    pub time_blocks: Vec<TimeBlockSpec>,
}

impl Default for CalendarSpec {
    fn default() -> Self {
        Self {
            minutes_per_hour: default_minutes_per_hour(),
            hours_per_day: default_hours_per_day(),
            days_per_month: default_days_per_month(),
            season_starts: default_season_starts(),
            time_blocks: default_time_blocks(),
        }
    }
}

/// Scheduler limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Cap on forward scans (`minutes_until`): predicates unsatisfied
    /// within this many game minutes are reported unreachable.
    #[serde(default = "default_scan_horizon_minutes")]
    pub scan_horizon_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_horizon_minutes: default_scan_horizon_minutes(),
        }
    }
}

/// Async work dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DispatchConfig {
    /// Number of worker tasks.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Maximum retries after the first attempt before an item is failed
    /// permanently.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Wall-clock budget per attempt, in milliseconds; attempts exceeding
    /// it are treated as transient failures.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Initial backoff delay after a transient failure, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Multiplier applied to the backoff delay after each failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Upper bound on the backoff delay, in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Maximum random jitter added to each backoff delay, in milliseconds.
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_ceiling: default_retry_ceiling(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
        }
    }
}

/// Deterministic action-category to game-minutes cost table.
///
/// The command-handling layer looks up the cost of a player action here
/// and passes the result as the `minutes` argument to `advance`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionCosts {
    /// Minutes of game time each action category consumes.
    #[serde(default)]
    pub costs: BTreeMap<String, u64>,
}

impl ActionCosts {
    /// Look up the minute cost of an action category.
    pub fn minutes_for(&self, category: &str) -> Option<u64> {
        self.costs.get(category).copied()
    }
}

/// Infrastructure connection strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// NATS server URL for the notification relay.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// `PostgreSQL` connection URL for the persistence boundary.
    #[serde(default = "default_postgres_url")]
    pub postgres_url: String,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            postgres_url: default_postgres_url(),
        }
    }
}

impl InfrastructureConfig {
    /// Override URLs from the environment (`NATS_URL`, `DATABASE_URL`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NATS_URL") {
            self.nats_url = url;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.postgres_url = url;
        }
    }
}

const fn default_minutes_per_hour() -> u64 {
    60
}

const fn default_hours_per_day() -> u64 {
    24
}

fn default_days_per_month() -> Vec<u64> {
    vec![30; 12]
}

fn default_season_starts() -> Vec<SeasonStartSpec> {
    vec![
        SeasonStartSpec {
            season: Season::Spring,
            month: 3,
            day: 1,
        },
        SeasonStartSpec {
            season: Season::Summer,
            month: 6,
            day: 1,
        },
        SeasonStartSpec {
            season: Season::Autumn,
            month: 9,
            day: 1,
        },
        SeasonStartSpec {
            season: Season::Winter,
            month: 12,
            day: 1,
        },
    ]
}

fn default_time_blocks() -> Vec<TimeBlockSpec> {
    vec![
        TimeBlockSpec {
            block: TimeBlock::Dawn,
            start_hour: 5,
            end_hour: 7,
        },
        TimeBlockSpec {
            block: TimeBlock::Morning,
            start_hour: 7,
            end_hour: 12,
        },
        TimeBlockSpec {
            block: TimeBlock::Afternoon,
            start_hour: 12,
            end_hour: 17,
        },
        TimeBlockSpec {
            block: TimeBlock::Dusk,
            start_hour: 17,
            end_hour: 20,
        },
        TimeBlockSpec {
            block: TimeBlock::Night,
            start_hour: 20,
            end_hour: 5,
        },
    ]
}

/// Ten years of game time under the default calendar (60 minutes, 24
/// hours, 360 days).
const fn default_scan_horizon_minutes() -> u64 {
    5_184_000
}

const fn default_workers() -> u32 {
    4
}

const fn default_retry_ceiling() -> u32 {
    3
}

const fn default_attempt_timeout_ms() -> u64 {
    30_000
}

const fn default_backoff_initial_ms() -> u64 {
    500
}

const fn default_backoff_multiplier() -> u32 {
    2
}

const fn default_backoff_max_ms() -> u64 {
    30_000
}

const fn default_backoff_jitter_ms() -> u64 {
    250
}

fn default_nats_url() -> String {
    String::from("nats://localhost:4222")
}

fn default_postgres_url() -> String {
    String::from("postgresql://localhost:5432/sundial")
}
