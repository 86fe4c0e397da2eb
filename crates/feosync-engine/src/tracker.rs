//! Progress and error reporting for long-running tasks.
//!
//! A [`TaskTracker`] collects log entries for one task and its nested
//! subtasks, so a UI can show what a sync did and what went wrong. Every
//! entry is also emitted as a `tracing` event inside a span for the task.
//!
//! Soft failures are reported here instead of being returned. A subtask that
//! fails records the error on its own tracker and its parent sees the
//! warning and error counts roll up.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use tracing::{error, info, info_span, warn, Instrument};

/// How many temporary entries to keep before collapsing older ones.
const DEFAULT_MAX_TEMP_LOGS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One entry in a task's log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: LogLevel,
    pub message: String,
    /// Temporary entries may be dropped when too many accumulate.
    pub temp: bool,
    /// Set when this entry started a subtask.
    pub subtask: Option<TaskTracker>,
}

struct TrackerState {
    name: String,
    logs: Vec<LogEntry>,
    warn_count: usize,
    error_count: usize,
    running: bool,
    has_run: bool,
    max_temp_logs: usize,
}

/// Tracks the progress of an async task.
///
/// Cloning is cheap; clones share the same log.
#[derive(Clone)]
pub struct TaskTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                name: "(unnamed)".into(),
                logs: Vec::new(),
                warn_count: 0,
                error_count: 0,
                running: false,
                has_run: false,
                max_temp_logs: DEFAULT_MAX_TEMP_LOGS,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.lock().logs.clone()
    }

    pub fn warn_count(&self) -> usize {
        self.lock().warn_count
    }

    pub fn error_count(&self) -> usize {
        self.lock().error_count
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Has this ever been run? (It might still be running.)
    pub fn has_run(&self) -> bool {
        self.lock().has_run
    }

    pub fn set_max_temp_logs(&self, max: usize) {
        self.lock().max_temp_logs = max;
    }

    /// Run `task` as the task tracked here, clearing any previous log.
    ///
    /// An error returned by the task is recorded on this tracker and then
    /// returned.
    pub async fn run<T, E, F, Fut>(&self, name: impl Into<String>, task: F) -> Result<T, E>
    where
        F: FnOnce(TaskTracker) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let name = name.into();
        {
            let mut state = self.lock();
            state.name = name.clone();
            state.logs.clear();
            state.warn_count = 0;
            state.error_count = 0;
            state.running = true;
            state.has_run = true;
        }

        let started = Instant::now();
        let span = info_span!("task", name = %name);
        let result = task(self.clone()).instrument(span.clone()).await;

        let _entered = span.enter();
        if let Err(e) = &result {
            self.error(format!("Task failed: {e}"));
        }
        self.lock().running = false;
        self.log(format!("Finished after {}.", format_elapsed(started.elapsed())));
        let (warnings, errors) = (self.warn_count(), self.error_count());
        if warnings > 0 {
            self.log(format!("Warnings: {warnings}"));
        }
        if errors > 0 {
            self.log(format!("Errors: {errors}"));
        }
        result
    }

    /// Run `task` as a named subtask with its own tracker.
    ///
    /// The subtask's warning and error counts are added to this tracker's
    /// when it finishes, whether or not it succeeded.
    pub async fn run_subtask<T, E, F, Fut>(&self, name: impl Into<String>, task: F) -> Result<T, E>
    where
        F: FnOnce(TaskTracker) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let name = name.into();
        let subtask = TaskTracker::new();
        self.lock().logs.push(LogEntry {
            timestamp: SystemTime::now(),
            level: LogLevel::Info,
            message: name.clone(),
            temp: false,
            subtask: Some(subtask.clone()),
        });

        let result = subtask.run(name, task).await;

        // Other clones may have collapsed temp entries meanwhile, so the
        // entry is found by identity rather than by position.
        let (warnings, errors) = (subtask.warn_count(), subtask.error_count());
        let mut state = self.lock();
        let entry = state.logs.iter_mut().find(|entry| {
            entry
                .subtask
                .as_ref()
                .is_some_and(|child| Arc::ptr_eq(&child.state, &subtask.state))
        });
        if let Some(entry) = entry {
            if errors > 0 {
                entry.level = LogLevel::Error;
            } else if warnings > 0 {
                entry.level = LogLevel::Warning;
            }
        }
        state.warn_count += warnings;
        state.error_count += errors;
        result
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.write(LogLevel::Info, message, false);
    }

    /// Log a message that may be collapsed if too many accumulate.
    pub fn log_temp(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.write(LogLevel::Info, message, true);
        self.collapse_temps();
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.write(LogLevel::Warning, message, false);
        self.lock().warn_count += 1;
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.write(LogLevel::Error, message, false);
        self.lock().error_count += 1;
    }

    fn write(&self, level: LogLevel, message: String, temp: bool) {
        self.lock().logs.push(LogEntry {
            timestamp: SystemTime::now(),
            level,
            message,
            temp,
            subtask: None,
        });
    }

    /// Keep only the newest `max_temp_logs` temporary entries.
    fn collapse_temps(&self) {
        let mut state = self.lock();
        let max = state.max_temp_logs;
        let temps = state.logs.iter().filter(|entry| entry.temp).count();
        if temps <= max {
            return;
        }

        let mut to_drop = temps - max;
        state.logs.retain(|entry| {
            if entry.temp && to_drop > 0 {
                to_drop -= 1;
                return false;
            }
            true
        });
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TaskTracker")
            .field("name", &state.name)
            .field("entries", &state.logs.len())
            .field("warn_count", &state.warn_count)
            .field("error_count", &state.error_count)
            .field("running", &state.running)
            .finish()
    }
}

/// Render an elapsed time like `137ms`, `8.3 seconds` or `2m5s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 500 {
        return format!("{millis}ms");
    }

    let secs = elapsed.as_secs_f64();
    if secs < 10.0 {
        return format!("{secs:.1} seconds");
    }
    if secs < 70.0 {
        return format!("{secs:.0} seconds");
    }

    let secs = secs.round() as u64;
    format!("{}m{}s", secs / 60, secs % 60)
}
