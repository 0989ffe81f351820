//! Synthetic threads for kernel subsystems that are not scheduler-visible.
//!
//! Workqueues and the i915 tracepoint pairs have no real thread of their
//! own; each tracked subsystem name gets a synthetic thread in the model and
//! an open/close interval discipline here.

use compact_str::CompactString;
use std::sync::LazyLock;

// Synthetic pid from a task label such as "kworker/0:1-1234".
static TASK_PID_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r".+-(\d+)").expect("Failed to compile regex"));

pub fn pid_from_task_label(label: &str) -> Option<i32> {
    let caps = TASK_PID_RE.captures(label)?;
    caps[1].parse().ok()
}

/// Open-interval state for one tracked subsystem. At most one interval is
/// open at a time; re-opening replaces the previous marker silently.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoThreadState {
    pub pid: i32,
    pub tid: i32,
    open_label: Option<CompactString>,
    open_start_us: f64,
}

impl PseudoThreadState {
    pub fn new(pid: i32, tid: i32) -> Self {
        Self {
            pid,
            tid,
            open_label: None,
            open_start_us: 0.0,
        }
    }

    /// Records an open marker.
    pub fn open_interval(&mut self, timestamp_us: f64, label: CompactString) {
        self.open_start_us = timestamp_us;
        self.open_label = Some(label);
    }

    /// Takes the open marker, if any, returning its label and start time.
    /// Closing with nothing open is a no-op.
    pub fn close_interval(&mut self) -> Option<(CompactString, f64)> {
        let label = self.open_label.take()?;
        Some((label, self.open_start_us))
    }
}
