use chrono::Local;
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::OnceLock;

// Custom logger structure
#[derive(Debug)]
struct VmLogger {
    level: LevelFilter,
    debug_filters: Option<HashSet<String>>,
}

// Implement the log::Log trait for our custom logger
impl log::Log for VmLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Check if the record's level is enabled
        if metadata.level() <= self.level {
            // If we have debug filters, check if the target matches any filter
            if let Some(filters) = &self.debug_filters {
                if metadata.level() == log::Level::Debug || metadata.level() == log::Level::Trace {
                    return filters.contains(metadata.target())
                        || filters.iter().any(|f| metadata.target().starts_with(f));
                }
            }
            return true;
        }
        false
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level_color = match record.level() {
                log::Level::Error => "\x1B[31m", // Red
                log::Level::Warn => "\x1B[33m",  // Yellow
                log::Level::Info => "\x1B[32m",  // Green
                log::Level::Debug => "\x1B[36m", // Cyan
                log::Level::Trace => "\x1B[35m", // Magenta
            };

            let reset = "\x1B[0m";
            let now = Local::now();
            let timestamp = now.format("%H:%M:%S%.3f");

            // Log lines go to stderr; stdout belongs to the running program
            let mut stderr = io::stderr();
            writeln!(
                stderr,
                "{timestamp} {level_color}{level:5}{reset} {target}: {message}",
                timestamp = timestamp,
                level_color = level_color,
                level = record.level(),
                reset = reset,
                target = record.target(),
                message = record.args()
            )
            .ok();
        }
    }

    fn flush(&self) {
        io::stderr().flush().ok();
    }
}

// Use OnceLock instead of unsafe static mut
static LOGGER: OnceLock<VmLogger> = OnceLock::new();

// Initialize the logger with optional debug filters
pub fn init_logger(level: LevelFilter, debug_filter: Option<String>) -> Result<(), SetLoggerError> {
    let debug_filters = debug_filter.map(|filter_str| {
        filter_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect::<HashSet<String>>()
    });

    let logger = LOGGER.get_or_init(|| VmLogger {
        level,
        debug_filters,
    });

    // Set the logger
    log::set_logger(logger).map(|()| log::set_max_level(level))
}
