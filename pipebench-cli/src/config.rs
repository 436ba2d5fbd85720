//! Benchmark configuration and CLI argument parsing
//!
//! Every option can be given on the command line or through the environment.
//! Store addresses use the plain names from the settings file
//! (`DRAGONFLY_ADDR`, `KEYDB_ADDR`, `REDIS_ADDR`, `REDIS_PASSWORD`); the
//! tool's own knobs use the `PIPEBENCH_` prefix.
//!
//! # Configuration Priority
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. The settings file (`.env` by default)
//! 4. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Default targets, ten seconds each
//! pipebench --duration 10s
//!
//! # A single ad-hoc target
//! pipebench --target staging=10.0.0.7:6379 --workers 200
//!
//! # Through the environment
//! export PIPEBENCH_WORKERS=500
//! export REDIS_ADDR=redis.internal:6379
//! pipebench
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use pipebench_client::PoolConfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::settings::{self, PLACEHOLDER_PASSWORD};

/// Resolved benchmark configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Stores to test, in order
    pub targets: Vec<TargetConfig>,
    /// Concurrent workers per target
    pub workers: usize,
    /// Measurement window per target
    pub duration: Duration,
    /// Connection pool settings shared by every target
    pub pool: PoolConfig,
    /// Text report destination
    pub output: PathBuf,
    /// Optional JSON report destination
    pub json_output: Option<PathBuf>,
    /// Interval for progress logging while a target runs
    pub progress: Option<Duration>,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Settings file that was loaded
    pub env_file: PathBuf,
    /// Whether the settings file was created by this run
    pub created_env_file: bool,
}

/// A labelled store address
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub label: String,
    pub addr: String,
}

impl TargetConfig {
    pub fn new(label: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            addr: addr.into(),
        }
    }
}

impl std::str::FromStr for TargetConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (label, addr) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid target: {}. Expected LABEL=ADDR", s))?;
        let (label, addr) = (label.trim(), addr.trim());
        if label.is_empty() || addr.is_empty() {
            return Err(anyhow!(
                "Invalid target: {}. Both LABEL and ADDR must be non-empty",
                s
            ));
        }
        Ok(TargetConfig::new(label, addr))
    }
}

/// Command-line arguments for the benchmark
///
/// All arguments can also be set via environment variables. CLI arguments
/// take precedence over environment variables.
///
/// # Examples
///
/// Compare two stores with fewer workers:
/// ```bash
/// pipebench --target a=127.0.0.1:6379 --target b=127.0.0.1:6380 --workers 100
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "pipebench",
    about = "Fixed-duration pipelined load test for RESP key-value stores",
    long_about = "Runs a fixed-duration pipelined load test against each configured store and writes a summary report.\n\nStore addresses are read from the settings file (.env) unless given on the command line.\n\nEnvironment variables with PIPEBENCH_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    // Targets
    #[arg(
        long,
        value_name = "ADDR",
        help = "DragonflyDB address",
        default_value = "localhost:6379",
        env = "DRAGONFLY_ADDR"
    )]
    pub dragonfly_addr: String,
    #[arg(
        long,
        value_name = "ADDR",
        help = "KeyDB address",
        default_value = "localhost:6380",
        env = "KEYDB_ADDR"
    )]
    pub keydb_addr: String,
    #[arg(
        long,
        value_name = "ADDR",
        help = "Redis address",
        default_value = "localhost:6381",
        env = "REDIS_ADDR"
    )]
    pub redis_addr: String,
    #[arg(
        long,
        value_name = "PASSWORD",
        help = "Password sent with AUTH to every target",
        env = "REDIS_PASSWORD",
        hide_env_values = true
    )]
    pub redis_password: Option<String>,
    #[arg(
        long = "target",
        value_name = "LABEL=ADDR",
        help = "Test this store instead of the three defaults (repeatable)"
    )]
    pub targets: Vec<TargetConfig>,

    // Load shape
    #[arg(
        long,
        value_name = "N",
        help = "Concurrent workers per target",
        default_value_t = 1000,
        env = "PIPEBENCH_WORKERS"
    )]
    pub workers: usize,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Measurement window per target (e.g. 5s, 1m)",
        default_value = "5s",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_DURATION"
    )]
    pub duration: Duration,

    // Connection pool
    #[arg(
        long,
        value_name = "N",
        help = "Maximum connections per target",
        default_value_t = 10_000,
        env = "PIPEBENCH_POOL_SIZE"
    )]
    pub pool_size: usize,
    #[arg(
        long,
        value_name = "N",
        help = "Connections opened before the run starts",
        default_value_t = 2_000,
        env = "PIPEBENCH_MIN_IDLE"
    )]
    pub min_idle: usize,
    #[arg(
        long,
        value_name = "N",
        help = "Retries for batches that fail at the transport level",
        default_value_t = 0,
        env = "PIPEBENCH_MAX_RETRIES"
    )]
    pub max_retries: usize,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Time allowed to open a connection",
        default_value = "5s",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: Duration,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Read timeout per batch, 0s disables",
        default_value = "25ms",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_READ_TIMEOUT"
    )]
    pub read_timeout: Duration,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Write timeout per batch, 0s disables",
        default_value = "25ms",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_WRITE_TIMEOUT"
    )]
    pub write_timeout: Duration,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Time a batch waits for a free connection",
        default_value = "15s",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_POOL_TIMEOUT"
    )]
    pub pool_timeout: Duration,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Idle connections older than this are closed, 0s disables",
        default_value = "15s",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_IDLE_TIMEOUT"
    )]
    pub idle_timeout: Duration,
    #[arg(
        long,
        value_name = "DURATION",
        help = "How often idle connections are checked",
        default_value = "15s",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_IDLE_CHECK_FREQUENCY"
    )]
    pub idle_check_frequency: Duration,

    // Output
    #[arg(
        long,
        value_name = "PATH",
        help = "Text report file",
        default_value = "results.txt",
        env = "PIPEBENCH_OUTPUT"
    )]
    pub output: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Also write the results as JSON",
        env = "PIPEBENCH_JSON_OUTPUT"
    )]
    pub json_output: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PATH",
        help = "Settings file, created with defaults if missing",
        default_value = ".env",
        env = "PIPEBENCH_ENV_FILE"
    )]
    pub env_file: PathBuf,
    #[arg(
        long,
        value_name = "DURATION",
        help = "Log running totals at this interval",
        value_parser = humantime::parse_duration,
        env = "PIPEBENCH_PROGRESS"
    )]
    pub progress: Option<Duration>,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "PIPEBENCH_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from the settings file, environment and CLI
    ///
    /// The arguments are parsed once to find the settings file, which is
    /// created if missing and loaded into the environment. They are then
    /// parsed again so its values act as env fallbacks.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        let created = settings::prepare(&args.env_file)?;

        let mut config = Self::from_args(Args::parse())?;
        config.created_env_file = created;
        Ok(config)
    }

    /// Build and validate configuration from parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let targets = if args.targets.is_empty() {
            [
                ("DragonflyDB", args.dragonfly_addr),
                ("KeyDB", args.keydb_addr),
                ("Redis", args.redis_addr),
            ]
            .into_iter()
            .filter(|(_, addr)| !addr.trim().is_empty())
            .map(|(label, addr)| TargetConfig::new(label, addr.trim()))
            .collect()
        } else {
            args.targets
        };

        let password = args
            .redis_password
            .filter(|p| !p.is_empty() && p != PLACEHOLDER_PASSWORD);

        let config = Config {
            targets,
            workers: args.workers,
            duration: args.duration,
            pool: PoolConfig {
                max_size: args.pool_size,
                min_idle: args.min_idle,
                max_retries: args.max_retries,
                connect_timeout: args.connect_timeout,
                read_timeout: args.read_timeout,
                write_timeout: args.write_timeout,
                pool_timeout: args.pool_timeout,
                idle_timeout: args.idle_timeout,
                idle_check_frequency: args.idle_check_frequency,
                password,
                ..PoolConfig::default()
            },
            output: args.output,
            json_output: args.json_output,
            progress: args.progress.filter(|p| !p.is_zero()),
            log_level: args.log_level,
            env_file: args.env_file,
            created_env_file: false,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(anyhow!(
                "At least one target must be configured.\n\n\
                Set DRAGONFLY_ADDR, KEYDB_ADDR or REDIS_ADDR, or pass targets explicitly:\n  \
                pipebench --target local=127.0.0.1:6379\n\n\
                For more information, try '--help'"
            ));
        }
        if self.workers == 0 {
            return Err(anyhow!("--workers must be greater than 0"));
        }
        if self.duration.is_zero() {
            return Err(anyhow!("--duration must be greater than 0"));
        }
        if self.pool.max_size == 0 {
            return Err(anyhow!("--pool-size must be greater than 0"));
        }
        if self.pool.min_idle > self.pool.max_size {
            return Err(anyhow!(
                "--min-idle ({}) cannot exceed --pool-size ({})",
                self.pool.min_idle,
                self.pool.max_size
            ));
        }
        Ok(())
    }

    /// Print all available environment variables and their descriptions
    fn print_env_vars() {
        println!("Pipebench Environment Variables");
        println!("===============================");
        println!();
        println!("Store addresses are usually kept in the settings file (.env).");
        println!("CLI arguments take precedence over environment variables.");
        println!();

        println!("Targets:");
        println!("  DRAGONFLY_ADDR=<host:port>             DragonflyDB address [default: localhost:6379]");
        println!("  KEYDB_ADDR=<host:port>                 KeyDB address [default: localhost:6380]");
        println!("  REDIS_ADDR=<host:port>                 Redis address [default: localhost:6381]");
        println!("  REDIS_PASSWORD=<password>              AUTH password for every target");
        println!();

        println!("Load:");
        println!("  PIPEBENCH_WORKERS=<n>                  Concurrent workers per target [default: 1000]");
        println!("  PIPEBENCH_DURATION=<duration>          Measurement window per target [default: 5s]");
        println!();

        println!("Connection Pool:");
        println!("  PIPEBENCH_POOL_SIZE=<n>                Maximum connections [default: 10000]");
        println!("  PIPEBENCH_MIN_IDLE=<n>                 Connections opened up front [default: 2000]");
        println!("  PIPEBENCH_MAX_RETRIES=<n>              Transport-level retries [default: 0]");
        println!("  PIPEBENCH_CONNECT_TIMEOUT=<duration>   Connect timeout [default: 5s]");
        println!("  PIPEBENCH_READ_TIMEOUT=<duration>      Read timeout [default: 25ms]");
        println!("  PIPEBENCH_WRITE_TIMEOUT=<duration>     Write timeout [default: 25ms]");
        println!("  PIPEBENCH_POOL_TIMEOUT=<duration>      Wait for a free connection [default: 15s]");
        println!("  PIPEBENCH_IDLE_TIMEOUT=<duration>      Idle connection lifetime [default: 15s]");
        println!("  PIPEBENCH_IDLE_CHECK_FREQUENCY=<duration>  Idle check interval [default: 15s]");
        println!();

        println!("Output:");
        println!("  PIPEBENCH_OUTPUT=<path>                Text report [default: results.txt]");
        println!("  PIPEBENCH_JSON_OUTPUT=<path>           JSON report");
        println!("  PIPEBENCH_ENV_FILE=<path>              Settings file [default: .env]");
        println!("  PIPEBENCH_PROGRESS=<duration>          Progress logging interval");
        println!(
            "  PIPEBENCH_LOG_LEVEL=<level>            Log level: error, warn, info, debug, trace [default: info]"
        );
        println!();

        println!("Examples:");
        println!("  # Ten second runs with 200 workers");
        println!("  export PIPEBENCH_DURATION=10s");
        println!("  export PIPEBENCH_WORKERS=200");
        println!();
        println!("  # Run (CLI args override env vars)");
        println!("  pipebench --workers 50  # Will use 50 workers, not 200");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // Explicit values for the env-backed options the tests assert on, so the
    // host environment cannot leak in. Options in `extra` replace the
    // baseline value; repeatable ones are appended.
    fn parse(extra: &[&str]) -> Result<Config> {
        let mut options = vec![
            ("--dragonfly-addr", "localhost:6379"),
            ("--keydb-addr", "localhost:6380"),
            ("--redis-addr", "localhost:6381"),
            ("--redis-password", ""),
            ("--workers", "1000"),
            ("--duration", "5s"),
            ("--pool-size", "10000"),
            ("--min-idle", "2000"),
        ];
        for pair in extra.chunks(2) {
            let (flag, value) = (pair[0], pair[1]);
            match options.iter_mut().find(|(f, _)| *f == flag && flag != "--target") {
                Some(option) => option.1 = value,
                None => options.push((flag, value)),
            }
        }

        let mut argv = vec!["pipebench"];
        for (flag, value) in options {
            argv.push(flag);
            argv.push(value);
        }
        Config::from_args(Args::try_parse_from(argv)?)
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!(
            TargetConfig::from_str("Redis=localhost:6381").unwrap(),
            TargetConfig::new("Redis", "localhost:6381")
        );
        assert_eq!(
            TargetConfig::from_str(" a = 10.0.0.1:6379 ").unwrap(),
            TargetConfig::new("a", "10.0.0.1:6379")
        );
        assert!(TargetConfig::from_str("localhost:6379").is_err());
        assert!(TargetConfig::from_str("=localhost:6379").is_err());
        assert!(TargetConfig::from_str("label=").is_err());
    }

    #[test]
    fn test_default_targets() {
        let config = parse(&[]).unwrap();

        assert_eq!(
            config.targets,
            vec![
                TargetConfig::new("DragonflyDB", "localhost:6379"),
                TargetConfig::new("KeyDB", "localhost:6380"),
                TargetConfig::new("Redis", "localhost:6381"),
            ]
        );
        assert_eq!(config.workers, 1000);
        assert_eq!(config.duration, Duration::from_secs(5));
        assert_eq!(config.pool.max_size, 10_000);
        assert_eq!(config.pool.min_idle, 2_000);
        assert_eq!(config.pool.password, None);
    }

    #[test]
    fn test_explicit_targets_replace_defaults() {
        let config = parse(&["--target", "a=127.0.0.1:7000", "--target", "b=127.0.0.1:7001"]).unwrap();

        assert_eq!(
            config.targets,
            vec![
                TargetConfig::new("a", "127.0.0.1:7000"),
                TargetConfig::new("b", "127.0.0.1:7001"),
            ]
        );
    }

    #[test]
    fn test_empty_address_skips_target() {
        let config = parse(&["--keydb-addr", ""]).unwrap();

        let labels: Vec<&str> = config.targets.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["DragonflyDB", "Redis"]);
    }

    #[test]
    fn test_no_targets_is_rejected() {
        let result = parse(&[
            "--dragonfly-addr",
            "",
            "--keydb-addr",
            "",
            "--redis-addr",
            "",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_placeholder_password_is_ignored() {
        let config = parse(&["--redis-password", PLACEHOLDER_PASSWORD]).unwrap();
        assert_eq!(config.pool.password, None);

        let config = parse(&["--redis-password", "s3cret"]).unwrap();
        assert_eq!(config.pool.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_humantime_durations() {
        let config = parse(&[
            "--duration",
            "1m 30s",
            "--read-timeout",
            "100ms",
            "--progress",
            "1s",
        ])
        .unwrap();

        assert_eq!(config.duration, Duration::from_secs(90));
        assert_eq!(config.pool.read_timeout, Duration::from_millis(100));
        assert_eq!(config.progress, Some(Duration::from_secs(1)));

        assert!(parse(&["--duration", "soon"]).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(parse(&["--workers", "0"]).is_err());
        assert!(parse(&["--duration", "0s"]).is_err());
        assert!(parse(&["--pool-size", "0", "--min-idle", "0"]).is_err());
        assert!(parse(&["--pool-size", "10", "--min-idle", "11"]).is_err());
        assert!(parse(&["--pool-size", "10", "--min-idle", "10"]).is_ok());
    }

    #[test]
    fn test_zero_progress_disables_reporting() {
        let config = parse(&["--progress", "0s"]).unwrap();
        assert_eq!(config.progress, None);
    }
}
