//! Driver logging
//!
//! Leveled diagnostic logging for the sequencer. The crate is a library
//! and has no output device of its own, so records land in a bounded
//! ring of recent entries and are forwarded to an optional sink
//! installed by the host stack.

use alloc::collections::VecDeque;
use alloc::string::String;
use lazy_static::lazy_static;
use spin::Mutex;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A captured log record
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Sink function installed by the host stack; receives every record as
/// it is produced, already formatted.
pub type LogSink = fn(LogLevel, &str);

const RECENT_CAPACITY: usize = 64;

lazy_static! {
    static ref RECENT: Mutex<VecDeque<LogRecord>> = Mutex::new(VecDeque::new());
}

static SINK: Mutex<Option<LogSink>> = Mutex::new(None);

/// Install a host log sink. Replaces any previous sink.
pub fn set_sink(sink: LogSink) {
    *SINK.lock() = Some(sink);
}

/// Drain and return the buffered recent records, oldest first.
pub fn take_recent() -> alloc::vec::Vec<LogRecord> {
    RECENT.lock().drain(..).collect()
}

/// Internal log funnel
#[doc(hidden)]
pub fn _log(level: LogLevel, args: core::fmt::Arguments) {
    let message = alloc::format!("{}", args);
    if let Some(sink) = *SINK.lock() {
        sink(level, &message);
    }
    let mut recent = RECENT.lock();
    if recent.len() == RECENT_CAPACITY {
        recent.pop_front();
    }
    recent.push_back(LogRecord { level, message });
}

/// Log macro with level
#[macro_export]
macro_rules! log_level {
    ($level:expr, $($arg:tt)*) => {
        $crate::logger::_log($level, format_args!($($arg)*))
    };
}

/// Info log (default)
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Info, $($arg)*)
    };
}

/// Debug log
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Debug, $($arg)*)
    };
}

/// Warning log
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Warn, $($arg)*)
    };
}

/// Error log
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Error, $($arg)*)
    };
}
