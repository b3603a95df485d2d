//! Logging for the command line tool: `log` records go to stderr so they never mix with file contents on stdout.

use std::io::{self, Write};

use log::{Level, LevelFilter, Metadata, Record};

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level_str = match record.level() {
                Level::Error => "ERROR",
                Level::Warn => "WARN ",
                Level::Info => "INFO ",
                Level::Debug => "DEBUG",
                Level::Trace => "TRACE",
            };

            // Format: [LEVEL] target: message
            let _ = writeln!(io::stderr().lock(), "[{}] {}: {}", level_str, record.target(), record.args());
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Installs the logger. Calling it again only changes the level.
pub fn init(level: LevelFilter) {
    // fails only if a logger is already installed, which is then kept
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Maps the number of `-v` flags to a level; warnings are always shown.
pub fn level_from_verbosity(verbosity: u64) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
