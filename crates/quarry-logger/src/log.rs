use crate::severity::LogSeverity;
use crate::systime::now;
use once_cell::sync::Lazy;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable read once for the initial threshold
pub const LOG_LEVEL_ENV: &str = "QUARRY_LOG";

static MIN_SEVERITY: Lazy<AtomicU8> = Lazy::new(|| {
    let initial = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|level| level.parse::<LogSeverity>().ok())
        .unwrap_or(LogSeverity::Info);
    AtomicU8::new(initial as u8)
});

/// Sets the lowest severity that is still printed
pub fn set_min_severity(severity: LogSeverity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

pub fn min_severity() -> LogSeverity {
    LogSeverity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
}

pub fn enabled(log_severity: LogSeverity) -> bool {
    log_severity >= min_severity()
}

/// Formats one log line without the trailing newline
pub fn format_line(msg: &str, log_severity: LogSeverity) -> String {
    format!("[{}] {} {}", log_severity, now(), msg)
}

/// Logs to stderr. Stdout is left alone because render workers report results on it.
pub fn log(msg: String, log_severity: LogSeverity) {
    if !enabled(log_severity) {
        return;
    }
    let line = format_line(&msg, log_severity);
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    // Nothing sensible to do if stderr is gone
    let _ = writeln!(handle, "{}", line);
}
