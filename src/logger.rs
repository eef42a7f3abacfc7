use chrono::Utc;
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Initialise the logger with UTC ISO8601 timestamps
pub fn init_logger(debug: bool) {
    let filter_level = if debug { "debug" } else { "info" };

    Builder::from_env(Env::default().default_filter_or(filter_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

/// Map a configured level name onto the global filter
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Set the logger level from configuration
pub fn set_log_level(level: &str) {
    log::set_max_level(level_filter(level));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_filter("DEBUG"), LevelFilter::Debug);
        assert_eq!(level_filter("warn"), LevelFilter::Warn);
        assert_eq!(level_filter("off"), LevelFilter::Off);
        assert_eq!(level_filter("verbose"), LevelFilter::Info);
    }
}
