use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const ENCODER_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Log target for per-operation query lines (filter, collection, duration).
pub const QUERY_TARGET: &str = "scoop::query";
/// Log target used by the `dev6!` macro.
pub const DEV6_TARGET: &str = "scoop::dev6";

/// Initializes the logging system from a log4rs YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or a logger is already installed.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn rolling_appender(
    base: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENCODER_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?;
    Ok(appender)
}

/// Builds the process log configuration: `app.log` for the root logger and
/// `query.log` for [`QUERY_TARGET`]. When `enable_dev6` is set, `dev6!` lines
/// are persisted to `dev6.log` as well.
///
/// # Errors
/// Returns an error if an appender cannot be created in `base`.
pub fn build_config(
    base: &Path,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<Config, Box<dyn std::error::Error>> {
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);
    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling_appender(base, "app", keep)?)))
        .appender(
            Appender::builder().build("query", Box::new(rolling_appender(base, "query", keep)?)),
        )
        .logger(Logger::builder().appender("query").additive(false).build(QUERY_TARGET, lvl));
    if enable_dev6 {
        builder = builder
            .appender(
                Appender::builder().build("dev6", Box::new(rolling_appender(base, "dev6", keep)?)),
            )
            .logger(
                Logger::builder()
                    .appender("dev6")
                    .additive(false)
                    .build(DEV6_TARGET, LevelFilter::Trace),
            );
    } else {
        builder = builder.logger(Logger::builder().additive(false).build(DEV6_TARGET, LevelFilter::Off));
    }
    Ok(builder.build(Root::builder().appender("app").build(lvl))?)
}

/// Configure logging globally for the process. If log4rs is already initialized
/// for this process the call leaves the existing logger in place.
/// - dir: base directory for logs; if None, current directory.
/// - level: error|warn|info|debug|trace|off
/// - retention: number of rolled files to keep (default 7)
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<usize>) {
    configure_logging_with_dev(dir, level, retention, false);
}

/// Same as [`configure_logging`] with optional `dev6.log` routing.
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    match build_config(&base, level, retention, enable_dev6) {
        Ok(config) => {
            let _ = log4rs::init_config(config);
        }
        Err(e) => eprintln!("scoop: failed to configure logging in {}: {e}", base.display()),
    }
}

/// Configure logging from environment variables if present:
/// - SCOOP_LOG_DIR
/// - SCOOP_LOG_LEVEL
/// - SCOOP_LOG_RETENTION
/// - SCOOP_DEV6
pub fn configure_from_env() {
    let dir = std::env::var("SCOOP_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("SCOOP_LOG_LEVEL").ok();
    let retention = std::env::var("SCOOP_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let dev6_enabled = std::env::var("SCOOP_DEV6")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging_with_dev(dir.as_deref(), level.as_deref(), retention, dev6_enabled);
}
