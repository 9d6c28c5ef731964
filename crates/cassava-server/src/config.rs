//! Configuration management for Cassava server
//!
//! Settings are layered: `conf/application.yml`, then `CASSAVA_` environment
//! variables, then command line overrides.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File, FileFormat};

use cassava_common::{
    BUILDIN_QUOTA_PLUGIN, CassavaError, DEFAULT_INSTANCE_QUOTA, DEFAULT_LOOKUP_TIMEOUT_MS,
    DEFAULT_RULE_QUOTA, DEFAULT_SCHEMA_QUOTA, DEFAULT_SERVICE_QUOTA, DEFAULT_TAG_QUOTA, Result,
};
use cassava_quota::{QuotaEngineConfig, QuotaLimits, SharedServicePolicy};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

pub const QUOTA_PLUGIN: &str = "quota.plugin";
pub const QUOTA_SHARED_SERVICES: &str = "quota.shared_services";
pub const QUOTA_LOOKUP_TIMEOUT_MS: &str = "quota.lookup_timeout_ms";
pub const QUOTA_WORKERS: &str = "quota.workers";
pub const QUOTA_METRICS_ENABLED: &str = "quota.metrics_enabled";
pub const REPLAY_FILE: &str = "replay.file";
pub const LOG_LEVEL: &str = "log.level";
pub const LOG_CONSOLE: &str = "log.console";
pub const LOG_FILE: &str = "log.file";
pub const LOG_DIR: &str = "log.dir";

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "cassava-server", about = "Watch-driven resource counting engine")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", env = "CASSAVA_CONFIG")]
    pub config: Option<PathBuf>,
    /// Quota plugin name
    #[arg(short = 'p', long = "plugin")]
    pub plugin: Option<String>,
    /// JSON lines file of change events, "-" for stdin
    #[arg(short = 'r', long = "replay")]
    pub replay: Option<String>,
    /// Event dispatch workers
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<i64>,
    /// Log level
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

/// Application configuration loaded from config files, environment, and CLI
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process arguments
    pub fn new() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self> {
        let config_file = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder()
            .add_source(
                File::new(&config_file.to_string_lossy(), FileFormat::Yaml)
                    .required(args.config.is_some()),
            )
            .add_source(
                Environment::with_prefix("cassava")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.plugin {
            builder = builder.set_override(QUOTA_PLUGIN, v).map_err(config_error)?;
        }
        if let Some(v) = args.replay {
            builder = builder.set_override(REPLAY_FILE, v).map_err(config_error)?;
        }
        if let Some(v) = args.workers {
            builder = builder.set_override(QUOTA_WORKERS, v).map_err(config_error)?;
        }
        if let Some(v) = args.log_level {
            builder = builder.set_override(LOG_LEVEL, v).map_err(config_error)?;
        }

        let config = builder.build().map_err(config_error)?;
        Ok(Configuration { config })
    }

    // ========================================================================
    // Quota Configuration
    // ========================================================================

    pub fn quota_plugin(&self) -> String {
        self.config
            .get_string(QUOTA_PLUGIN)
            .unwrap_or(BUILDIN_QUOTA_PLUGIN.to_string())
    }

    pub fn shared_services(&self) -> SharedServicePolicy {
        SharedServicePolicy::from_csv(
            &self
                .config
                .get_string(QUOTA_SHARED_SERVICES)
                .unwrap_or_default(),
        )
    }

    pub fn lookup_timeout(&self) -> Duration {
        let ms = self
            .config
            .get_int(QUOTA_LOOKUP_TIMEOUT_MS)
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_LOOKUP_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn workers(&self) -> usize {
        self.config
            .get_int(QUOTA_WORKERS)
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .unwrap_or(1)
    }

    pub fn metrics_enabled(&self) -> bool {
        self.config.get_bool(QUOTA_METRICS_ENABLED).unwrap_or(true)
    }

    fn limit(&self, kind: &str, default: i64) -> i64 {
        self.config
            .get_int(&format!("quota.limit.{}", kind))
            .ok()
            .filter(|v| *v >= 0)
            .unwrap_or(default)
    }

    pub fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            service: self.limit("service", DEFAULT_SERVICE_QUOTA),
            instance: self.limit("instance", DEFAULT_INSTANCE_QUOTA),
            schema: self.limit("schema", DEFAULT_SCHEMA_QUOTA),
            tag: self.limit("tag", DEFAULT_TAG_QUOTA),
            rule: self.limit("rule", DEFAULT_RULE_QUOTA),
        }
    }

    pub fn quota_engine_config(&self) -> QuotaEngineConfig {
        QuotaEngineConfig {
            plugin: self.quota_plugin(),
            shared_services: self.shared_services(),
            lookup_timeout: self.lookup_timeout(),
            limits: self.quota_limits(),
            metrics_enabled: self.metrics_enabled(),
            workers: self.workers(),
        }
    }

    // ========================================================================
    // Replay Configuration
    // ========================================================================

    pub fn replay_file(&self) -> String {
        self.config
            .get_string(REPLAY_FILE)
            .unwrap_or("-".to_string())
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOG_DIR).ok(),
            self.config.get_bool(LOG_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOG_FILE).unwrap_or(false),
            self.config
                .get_string(LOG_LEVEL)
                .unwrap_or("info".to_string()),
        )
    }
}

fn config_error(e: config::ConfigError) -> CassavaError {
    CassavaError::ConfigError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn default_cli() -> Cli {
        Cli {
            config: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let configuration = Configuration::from_cli(default_cli()).unwrap();
        assert_eq!(configuration.quota_plugin(), "buildin");
        assert_eq!(
            configuration.shared_services().names().collect::<Vec<_>>(),
            vec!["SERVICECENTER"]
        );
        assert_eq!(configuration.lookup_timeout(), Duration::from_millis(3000));
        assert_eq!(configuration.workers(), 1);
        assert_eq!(configuration.quota_limits(), QuotaLimits::default());
        assert_eq!(configuration.replay_file(), "-");
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "cassava-server",
            "--plugin",
            "unlimit",
            "--workers",
            "4",
            "--replay",
            "events.jsonl",
        ])
        .unwrap();
        let configuration = Configuration::from_cli(cli).unwrap();
        assert_eq!(configuration.quota_plugin(), "unlimit");
        assert_eq!(configuration.workers(), 4);
        assert_eq!(configuration.replay_file(), "events.jsonl");
        assert_eq!(configuration.quota_engine_config().plugin, "unlimit");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "quota:\n  shared_services: \"auth, gateway\"\n  lookup_timeout_ms: 500\n  limit:\n    instance: 10\n"
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let configuration = Configuration::from_cli(cli).unwrap();
        let mut names: Vec<&str> = Vec::new();
        let shared = configuration.shared_services();
        names.extend(shared.names());
        names.sort_unstable();
        assert_eq!(names, vec!["SERVICECENTER", "auth", "gateway"]);
        assert_eq!(configuration.lookup_timeout(), Duration::from_millis(500));
        assert_eq!(configuration.quota_limits().instance, 10);
        assert_eq!(configuration.quota_limits().service, DEFAULT_SERVICE_QUOTA);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/cassava.yml")),
            ..Default::default()
        };
        assert!(matches!(
            Configuration::from_cli(cli),
            Err(CassavaError::ConfigError(_))
        ));
    }
}
