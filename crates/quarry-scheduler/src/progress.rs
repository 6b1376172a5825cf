use quarry_logger::{log, LogSeverity};
use std::sync::{Arc, RwLock};

/// Receives `(label, (completed, total))` updates from the scheduler
pub trait ProgressReporter: Send + Sync {
    fn report(&self, label: &str, completed: usize, total: usize);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub label: String,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

/// Drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _label: &str, _completed: usize, _total: usize) {}
}

/// Logs updates, at most one line per `step` completions plus the last one
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    step: usize,
}

impl LogProgress {
    pub fn new(step: usize) -> Self {
        Self { step: step.max(1) }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ProgressReporter for LogProgress {
    fn report(&self, label: &str, completed: usize, total: usize) {
        if completed % self.step == 0 || completed == total {
            log(format!("{} {}/{}", label, completed, total), LogSeverity::Info);
        }
    }
}

/// Latest update, readable from another task (the viewer's status line)
#[derive(Debug, Clone, Default)]
pub struct SharedProgress {
    latest: Arc<RwLock<Option<Progress>>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Progress> {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }

    fn set(&self, progress: Option<Progress>) {
        match self.latest.write() {
            Ok(mut latest) => *latest = progress,
            Err(poisoned) => *poisoned.into_inner() = progress,
        }
    }
}

impl ProgressReporter for SharedProgress {
    fn report(&self, label: &str, completed: usize, total: usize) {
        self.set(Some(Progress {
            label: label.to_owned(),
            completed,
            total,
        }));
    }
}
