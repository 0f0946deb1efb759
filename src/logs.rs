use std::io::Write;
use chrono::Local;
use log::{Level, LevelFilter};
use crate::utils::APP_NAME;

const CRATE_TARGET: &str = "yggdrasil_proxy";

/// Installs the global logger. Everything goes to stderr: stdout belongs to
/// the Java process we stand in for, and launchers parse it.
pub fn init(debug: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.target(env_logger::Target::Stderr);
    if debug {
        builder.filter_module(CRATE_TARGET, LevelFilter::Debug);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}",
            format_line(
                &Local::now().format("%H:%M:%S").to_string(),
                record.level(),
                record.target(),
                &record.args().to_string(),
            )
        )
    });

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

pub fn format_line(time: &str, level: Level, target: &str, message: &str) -> String {
    let source = target.rsplit("::").next().unwrap_or(target);
    if source == CRATE_TARGET || source.is_empty() {
        format!("[{}] {} {} {}", APP_NAME, time, level_str(level), message)
    } else {
        format!("[{}] {} {} [{}] {}", APP_NAME, time, level_str(level), source, message)
    }
}
