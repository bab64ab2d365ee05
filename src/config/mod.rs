//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "polizza";
const DEFAULT_CACHE_ENTRY_LIMIT: usize = 2048;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Command-line arguments for the polizza binary.
#[derive(Debug, Parser)]
#[command(name = "polizza", version, about = "Insurance portfolio store with a query cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "POLIZZA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate the resolved configuration and exit.
    #[command(name = "check-config")]
    CheckConfig,
    /// Print the resolved configuration as JSON.
    #[command(name = "print-config")]
    PrintConfig,
    /// Load seed data: a JSON file, or the embedded demo set.
    Seed(SeedArgs),
    /// Run one catalogued query and print its rows.
    Query(QueryArgs),
    /// Print cache statistics.
    Stats,
    /// List live cache keys with their remaining TTLs.
    Keys,
    /// Drop cached views matching a pattern.
    Flush(FlushArgs),
    /// Rebuild the coverage ranking from the store.
    #[command(name = "rebuild-ranking")]
    RebuildRanking,
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    /// Seed file to load; the embedded demo dataset when omitted.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct QueryArgs {
    /// Catalogued query name, e.g. `active_clients`.
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Claim year, for queries keyed by year.
    #[arg(long, value_name = "YEAR")]
    pub year: Option<i32>,
}

#[derive(Debug, Args, Clone)]
pub struct FlushArgs {
    /// Key pattern to drop; the whole keyspace when omitted.
    #[arg(long, value_name = "PATTERN")]
    pub pattern: Option<String>,
}

/// Overrides shared by every subcommand, applied on top of file and
/// environment sources.
#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Toggle the query cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache entry limit.
    #[arg(long = "cache-entry-limit", value_name = "COUNT", global = true)]
    pub cache_entry_limit: Option<usize>,

    /// Override the fallback TTL for cached views.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS", global = true)]
    pub cache_default_ttl_seconds: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub entry_limit: usize,
    pub default_ttl_secs: u64,
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("POLIZZA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    cache: RawCacheSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(limit) = overrides.cache_entry_limit {
            self.cache.entry_limit = Some(limit);
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_secs = Some(ttl);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { cache, logging } = raw;

        let cache = build_cache_settings(cache)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self { cache, logging })
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let entry_limit = cache.entry_limit.unwrap_or(DEFAULT_CACHE_ENTRY_LIMIT);
    if entry_limit == 0 {
        return Err(LoadError::invalid(
            "cache.entry_limit",
            "must be greater than zero",
        ));
    }

    let default_ttl_secs = cache.default_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if default_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_secs",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        entry_limit,
        default_ttl_secs,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    entry_limit: Option<usize>,
    default_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.cache.default_ttl_secs = Some(300);
        raw.logging.level = Some("info".to_string());

        let overrides = Overrides {
            cache_default_ttl_seconds: Some(600),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.cache.default_ttl_secs, 600);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn defaults_fill_every_section() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.entry_limit, DEFAULT_CACHE_ENTRY_LIMIT);
        assert_eq!(settings.cache.default_ttl(), Duration::from_secs(300));
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
    }

    #[test]
    fn zero_cache_limits_are_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.entry_limit = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "cache.entry_limit",
                ..
            })
        ));

        let mut raw = RawSettings::default();
        raw.cache.default_ttl_secs = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "cache.default_ttl_secs",
                ..
            })
        ));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = Overrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn parse_seed_arguments() {
        let args = CliArgs::parse_from(["polizza", "seed", "--file", "/tmp/seed.json"]);

        match args.command {
            Command::Seed(seed) => {
                assert_eq!(seed.file.as_deref(), Some(std::path::Path::new("/tmp/seed.json")));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_query_arguments() {
        let args = CliArgs::parse_from(["polizza", "query", "accident_claims", "--year", "2024"]);

        match args.command {
            Command::Query(query) => {
                assert_eq!(query.name, "accident_claims");
                assert_eq!(query.year, Some(2024));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_flush_arguments() {
        let args = CliArgs::parse_from(["polizza", "flush", "--pattern", "query1:*"]);

        match args.command {
            Command::Flush(flush) => {
                assert_eq!(flush.pattern.as_deref(), Some("query1:*"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn global_overrides_parse_after_the_subcommand() {
        let args = CliArgs::parse_from(["polizza", "stats", "--log-level", "warn", "--cache-enabled", "false"]);

        assert!(matches!(args.command, Command::Stats));
        assert_eq!(args.overrides.log_level.as_deref(), Some("warn"));
        assert_eq!(args.overrides.cache_enabled, Some(false));
    }

    #[test]
    fn config_file_values_flow_into_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("polizza.toml");
        std::fs::write(
            &path,
            "[cache]\nentry_limit = 64\n\n[logging]\nlevel = \"warn\"\n",
        )
        .expect("write config");

        let args = CliArgs::parse_from([
            "polizza",
            "--config-file",
            path.to_str().expect("utf8 path"),
            "stats",
        ]);
        let settings = load(&args).expect("valid settings");

        assert_eq!(settings.cache.entry_limit, 64);
        assert_eq!(settings.logging.level, LevelFilter::WARN);
    }
}
