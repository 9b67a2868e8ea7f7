//! Diagnostics and the progress/error channels of a generation run.

use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// A single reportable failure, rendered as one line.
///
/// `identity` names the template or document that failed; `line` is 1-based
/// and absent when the failure has no position (e.g. a missing template).
/// A diagnostic with an empty identity prints its message alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub identity: String,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(identity: impl Into<String>, line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            line,
            message: message.into(),
        }
    }

    /// A diagnostic without a line number.
    pub fn bare(identity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(identity, None, message)
    }

    /// A diagnostic that is only a message.
    pub fn plain(message: impl Into<String>) -> Self {
        Self::new(String::new(), None, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identity.is_empty() {
            return f.write_str(&self.message);
        }
        match self.line {
            Some(line) => write!(f, "{}:{}: error: {}", self.identity, line, self.message),
            None => write!(f, "{}: error: {}", self.identity, self.message),
        }
    }
}

/// Sink for progress lines and diagnostics.
///
/// Progress lines (`merge: ...`, `process: ...`) go to standard output,
/// diagnostics to standard error, one line each.
pub trait Reporter: Send + Sync {
    fn progress(&self, line: &str);
    fn error(&self, diagnostic: &Diagnostic);
}

/// Writes to the process streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn progress(&self, line: &str) {
        println!("{}", line);
    }

    fn error(&self, diagnostic: &Diagnostic) {
        eprintln!("{}", diagnostic);
    }
}

/// Records everything it is given; used by tests and embedders that want
/// to inspect a run after the fact.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    progress: Mutex<Vec<String>>,
    errors: Mutex<Vec<Diagnostic>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_lines(&self) -> Vec<String> {
        lock(&self.progress).clone()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        lock(&self.errors).clone()
    }

    /// Diagnostics rendered the way [`ConsoleReporter`] prints them.
    pub fn error_lines(&self) -> Vec<String> {
        lock(&self.errors).iter().map(ToString::to_string).collect()
    }

    pub fn clear(&self) {
        lock(&self.progress).clear();
        lock(&self.errors).clear();
    }
}

impl Reporter for MemoryReporter {
    fn progress(&self, line: &str) {
        lock(&self.progress).push(line.to_string());
    }

    fn error(&self, diagnostic: &Diagnostic) {
        lock(&self.errors).push(diagnostic.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
