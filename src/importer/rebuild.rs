//! Derives each thread's gapless timeline from the CPU slices it owned.

use crate::importer::ImportError;
use crate::model;
use crate::model::Slice;
use crate::model::SliceArgs;

/// Why a task stopped running, derived from the single-character code
/// recorded at deschedule time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    Sleeping,
    Runnable,
    IoWait,
    Stopped,
    Debug,
    Zombie,
    Dead,
    WakeKill,
}

impl GapKind {
    pub fn from_desched_state(state: char) -> Option<Self> {
        match state {
            'S' => Some(Self::Sleeping),
            'R' => Some(Self::Runnable),
            'D' => Some(Self::IoWait),
            'T' => Some(Self::Stopped),
            't' => Some(Self::Debug),
            'Z' => Some(Self::Zombie),
            'X' | 'x' => Some(Self::Dead),
            'W' => Some(Self::WakeKill),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sleeping => "Sleeping",
            Self::Runnable => "Runnable",
            Self::IoWait => "I/O Wait",
            Self::Stopped => "Stopped",
            Self::Debug => "Debug",
            Self::Zombie => "Zombie",
            Self::Dead => "Dead",
            Self::WakeKill => "WakeKill",
        }
    }

    /// Only the common states get their own color; the rarer wait states
    /// share the I/O wait key.
    pub fn color_key(self) -> u32 {
        match self {
            Self::Sleeping => model::SLEEPING_COLOR,
            Self::Runnable => model::RUNNABLE_COLOR,
            _ => model::IO_WAIT_COLOR,
        }
    }
}

fn running_slice(from: &Slice) -> Slice {
    Slice {
        name: "Running".into(),
        color_key: model::RUNNING_COLOR,
        start_us: from.start_us,
        duration_us: from.duration_us,
        args: SliceArgs::None,
    }
}

/// Builds the gapless timeline for one thread from the CPU slices assigned
/// to it: a `Running` slice per real slice, with one synthesized gap slice
/// between each adjacent pair so the result has no temporal holes.
pub fn build_thread_timeline(mut slices: Vec<Slice>) -> Result<Vec<Slice>, ImportError> {
    // Stable: slices with equal start keep their arrival order.
    slices.sort_by(|a, b| a.start_us.total_cmp(&b.start_us));

    let mut timeline = Vec::with_capacity(slices.len().saturating_mul(2));
    if let Some(first) = slices.first() {
        timeline.push(running_slice(first));
    }
    for pair in slices.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let SliceArgs::Sched {
            tid,
            state_when_descheduled,
            ..
        } = &prev.args
        else {
            unreachable!("CPU slices always carry scheduling args");
        };
        let kind = GapKind::from_desched_state(*state_when_descheduled).ok_or(
            ImportError::UnknownDeschedState {
                state: *state_when_descheduled,
                tid: *tid,
            },
        )?;
        timeline.push(Slice {
            name: kind.label().into(),
            color_key: kind.color_key(),
            start_us: prev.end_us(),
            duration_us: next.start_us - prev.end_us(),
            args: SliceArgs::None,
        });
        timeline.push(running_slice(next));
    }
    Ok(timeline)
}
