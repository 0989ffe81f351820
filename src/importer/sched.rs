//! Per-CPU scheduling state machine.

use crate::model;
use crate::model::Slice;
use crate::model::SliceArgs;
use compact_str::CompactString;

/// The idle task. It never produces slices; idle time is the absence of
/// slices, filled in by the reconstruction pass.
pub const IDLE_PID: i32 = 0;

/// The task currently running on a CPU.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTask {
    pub pid: i32,
    pub comm: CompactString,
    pub prio: i32,
    pub start_us: f64,
}

/// Scheduling state for a single CPU. Tracks the running task and emits a
/// completed slice whenever `sched_switch` replaces it.
#[derive(Debug, Default)]
pub struct CpuSchedState {
    last_active: Option<ActiveTask>,
}

impl CpuSchedState {
    /// Switches the running task on this CPU. Returns the completed slice
    /// for the previously running task, unless that task was the idle task.
    ///
    /// `resolve_name` maps a pid to the model's name for that thread; the
    /// raw comm string is the fallback for pids the model does not know.
    pub fn switch_running_task(
        &mut self,
        timestamp_us: f64,
        prev_state: char,
        next: ActiveTask,
        resolve_name: impl FnOnce(i32) -> Option<CompactString>,
    ) -> Option<Slice> {
        let slice = match self.last_active.take() {
            Some(prev) if prev.pid != IDLE_PID => {
                let name = resolve_name(prev.pid).unwrap_or_else(|| prev.comm.clone());
                Some(Slice {
                    color_key: model::string_color_key(&name),
                    name,
                    start_us: prev.start_us,
                    duration_us: timestamp_us - prev.start_us,
                    args: SliceArgs::Sched {
                        comm: prev.comm,
                        tid: prev.pid,
                        prio: prev.prio,
                        state_when_descheduled: prev_state,
                    },
                })
            }
            _ => None,
        };
        self.last_active = Some(next);
        slice
    }
}
