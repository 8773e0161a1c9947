//! log4rs setup for applications embedding the mapper.
//!
//! The crate itself only talks to the `log` facade. Targets used:
//! - `nexusodm::query` for issued queries and cache decisions
//! - `nexusodm::write` for persistence shortcuts
//! - `nexusodm::dev6` for developer trace lines (see [`crate::dev6`])

use crate::errors::{OdmError, Result};
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_BYTES: u64 = 10 * 1024 * 1024;

/// Initializes logging from `log4rs.yaml` in the working directory.
///
/// # Errors
/// Returns an error if the file is missing or invalid.
pub fn init() -> Result<()> {
    log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default())
        .map_err(|e| OdmError::Logging(e.to_string()))
}

#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(|e| OdmError::Logging(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))
        .map_err(|e| OdmError::Logging(e.to_string()))
}

/// Builds the log4rs configuration: `odm.log` for everything, `queries.log` for
/// the query target, and optionally `dev6.log` for developer trace lines.
///
/// # Errors
/// Returns an error if the directory or appenders cannot be created.
pub fn build_config(
    dir: &Path,
    level: LevelFilter,
    retention: u32,
    enable_dev6: bool,
) -> Result<Config> {
    std::fs::create_dir_all(dir)?;
    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(dir, "odm", retention)?)))
        .appender(
            Appender::builder().build("queries", Box::new(rolling(dir, "queries", retention)?)),
        )
        .logger(Logger::builder().appender("queries").build("nexusodm::query", level));
    if enable_dev6 {
        builder = builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(dir, "dev6", retention)?)))
            .logger(
                Logger::builder()
                    .appender("dev6")
                    .additive(false)
                    .build("nexusodm::dev6", LevelFilter::Trace),
            );
    } else {
        builder = builder
            .logger(Logger::builder().additive(false).build("nexusodm::dev6", LevelFilter::Off));
    }
    builder
        .build(Root::builder().appender("app").build(level))
        .map_err(|e| OdmError::Logging(e.to_string()))
}

/// Configure logging for the process. A second call is ignored by log4rs and
/// reported as an error.
///
/// # Errors
/// Returns an error if the config cannot be built or a logger is already set.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<u32>,
    enable_dev6: bool,
) -> Result<()> {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let config = build_config(&base, parse_level(level), retention.unwrap_or(7), enable_dev6)?;
    log4rs::init_config(config).map_err(|e| OdmError::Logging(e.to_string()))?;
    Ok(())
}

/// Configure logging from environment variables if present:
/// - NEXUSODM_LOG_DIR
/// - NEXUSODM_LOG_LEVEL
/// - NEXUSODM_LOG_RETENTION
/// - NEXUSODM_DEV6
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<()> {
    let dir = std::env::var("NEXUSODM_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("NEXUSODM_LOG_LEVEL").ok();
    let retention =
        std::env::var("NEXUSODM_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok());
    let dev6 = std::env::var("NEXUSODM_DEV6")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging(dir.as_deref(), level.as_deref(), retention, dev6)
}
