//! Collector for lenient evaluation.
//!
//! Passing a [`Logger`] to a query opts into lenient mode: recoverable failures are
//! recorded here (and forwarded to the `log` facade) and a sentinel value is returned
//! instead of an error.

use std::cell::RefCell;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Warning => f.write_str("WARNING"),
            LogLevel::Error => f.write_str("ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

#[derive(Debug, Default)]
pub struct Logger {
    records: RefCell<Vec<LogRecord>>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.push(LogLevel::Error, message);
    }

    fn push(&self, level: LogLevel, message: String) {
        self.records.borrow_mut().push(LogRecord { level, message });
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages(LogLevel::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(LogLevel::Error)
    }

    fn messages(&self, level: LogLevel) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|record| record.level == level)
            .map(|record| record.message.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Remove and return all records
    pub fn drain(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }
}
