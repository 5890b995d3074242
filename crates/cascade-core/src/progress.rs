//! Progress reporting interface and console renderer.
//!
//! The engine emits coarse, named progress events: one per CA iteration and
//! one per completed statistical test. Sinks must not stall the computation;
//! the console sink keeps its critical section to a timestamp check and
//! swallows all I/O errors.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receiver for named-task progress events.
pub trait ProgressSink: Send + Sync {
    /// `processed` of `total` units of `task` are done.
    fn update(&self, task: &str, processed: u64, total: u64);

    /// `task` finished; the sink may clear any transient display state.
    fn complete(&self, task: &str);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _task: &str, _processed: u64, _total: u64) {}
    fn complete(&self, _task: &str) {}
}

/// Console sink: a `\r`-refreshed bar on stderr, throttled per task.
///
/// Updates within the throttle interval are dropped (except the final one at
/// `processed == total`), so a fast producer cannot turn progress reporting
/// into the bottleneck.
pub struct ConsoleSink {
    min_interval: Duration,
    last_render: Mutex<HashMap<String, Instant>>,
}

impl ConsoleSink {
    const BAR_WIDTH: usize = 40;

    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(100))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_render: Mutex::new(HashMap::new()),
        }
    }

    fn render(task: &str, processed: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        };
        let filled = (fraction * Self::BAR_WIDTH as f64) as usize;
        let bar: String = (0..Self::BAR_WIDTH)
            .map(|i| if i < filled { '=' } else { ' ' })
            .collect();
        let mut err = std::io::stderr().lock();
        // A failed write to stderr is not the engine's problem.
        let _ = write!(
            err,
            "\r{task}: [{bar}] {:5.1}% ({processed}/{total})",
            fraction * 100.0
        );
        let _ = err.flush();
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn update(&self, task: &str, processed: u64, total: u64) {
        let now = Instant::now();
        {
            let mut last = match self.last_render.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            let due = match last.get(task) {
                Some(&t) => now.duration_since(t) >= self.min_interval,
                None => true,
            };
            if !due && processed < total {
                return;
            }
            last.insert(task.to_string(), now);
        }
        Self::render(task, processed, total);
    }

    fn complete(&self, task: &str) {
        if let Ok(mut last) = self.last_render.lock() {
            last.remove(task);
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "\r{task}: done{:width$}", "", width = ConsoleSink::BAR_WIDTH);
    }
}
