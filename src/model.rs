//! In-memory timeline model the importer populates.
//!
//! Registries are arena-style maps keyed by CPU number, pid and tid. Thread
//! identity is the `(pid, tid)` pair; nothing holds cross-references. The
//! importer is the sole writer for the duration of an import.

use compact_str::CompactString;
use compact_str::format_compact;
use serde_derive::Serialize;
use std::collections::BTreeMap;

/// Color key for derived `Running` slices.
pub const RUNNING_COLOR: u32 = 0;
/// Color key for derived `Runnable` slices.
pub const RUNNABLE_COLOR: u32 = 1;
/// Color key for derived `Sleeping` slices.
pub const SLEEPING_COLOR: u32 = 2;
/// Color key for derived `I/O Wait` slices, shared by the rarer wait states.
pub const IO_WAIT_COLOR: u32 = 3;

const RESERVED_COLORS: u32 = 4;
const GENERAL_PALETTE_SIZE: u32 = 76;

/// Stable color key for a label, folded into the general palette above the
/// reserved keys. The actual palette lives in the rendering layer; the model
/// only guarantees that equal labels get equal keys.
pub fn string_color_key(label: &str) -> u32 {
    // FNV-1a
    let mut hash: u32 = 0x811c_9dc5;
    for byte in label.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    RESERVED_COLORS + hash % GENERAL_PALETTE_SIZE
}

/// Typed attributes attached to a slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SliceArgs {
    Sched {
        comm: CompactString,
        tid: i32,
        prio: i32,
        state_when_descheduled: char,
    },
    GemPwrite {
        obj: CompactString,
        offset: i64,
        len: i64,
    },
    Flip {
        obj: CompactString,
        plane: i64,
    },
    None,
}

/// A labeled time span attached to a CPU or thread. Immutable once created,
/// except for the start-time rewrite during clock alignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub name: CompactString,
    pub color_key: u32,
    pub start_us: f64,
    pub duration_us: f64,
    pub args: SliceArgs,
}

impl Slice {
    pub fn end_us(&self) -> f64 {
        self.start_us + self.duration_us
    }
}

/// A counter attached to a CPU: parallel series/timestamp/sample sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Counter {
    pub name: CompactString,
    pub series_names: Vec<CompactString>,
    pub series_colors: Vec<u32>,
    pub timestamps: Vec<f64>,
    pub samples: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cpu {
    pub number: u32,
    pub slices: Vec<Slice>,
    pub counters: BTreeMap<CompactString, Counter>,
}

impl Cpu {
    pub fn get_or_create_counter(&mut self, device: &str, name: &str) -> &mut Counter {
        let key = if device.is_empty() {
            CompactString::from(name)
        } else {
            format_compact!("{device}.{name}")
        };
        self.counters.entry(key.clone()).or_insert_with(|| Counter {
            name: key,
            ..Counter::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Thread {
    pub tid: i32,
    pub name: CompactString,
    /// Slices recorded directly on the thread (pseudo-thread subsystems).
    pub slices: Vec<Slice>,
    /// Derived gapless timeline built by the reconstruction pass.
    pub cpu_slices: Vec<Slice>,
}

impl Thread {
    pub fn user_friendly_name(&self) -> CompactString {
        if self.name.is_empty() {
            format_compact!("thread {}", self.tid)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Process {
    pub pid: i32,
    pub threads: BTreeMap<i32, Thread>,
}

impl Process {
    pub fn get_or_create_thread(&mut self, tid: i32) -> &mut Thread {
        self.threads.entry(tid).or_insert_with(|| Thread {
            tid,
            ..Thread::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Model {
    pub cpus: BTreeMap<u32, Cpu>,
    pub processes: BTreeMap<i32, Process>,
    /// Importer diagnostics in arrival order. Appended to, never read back.
    pub import_errors: Vec<String>,
}

impl Model {
    pub fn contains_cpu(&self, number: u32) -> bool {
        self.cpus.contains_key(&number)
    }

    pub fn get_or_create_cpu(&mut self, number: u32) -> &mut Cpu {
        self.cpus.entry(number).or_insert_with(|| Cpu {
            number,
            ..Cpu::default()
        })
    }

    pub fn contains_process(&self, pid: i32) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn get_or_create_process(&mut self, pid: i32) -> &mut Process {
        self.processes.entry(pid).or_insert_with(|| Process {
            pid,
            ..Process::default()
        })
    }

    /// All threads currently in the model, with their owning pid.
    pub fn all_threads(&self) -> impl Iterator<Item = (i32, &Thread)> {
        self.processes
            .iter()
            .flat_map(|(pid, process)| process.threads.values().map(|thread| (*pid, thread)))
    }

    pub fn thread(&self, pid: i32, tid: i32) -> Option<&Thread> {
        self.processes.get(&pid)?.threads.get(&tid)
    }

    pub fn thread_mut(&mut self, pid: i32, tid: i32) -> Option<&mut Thread> {
        self.processes.get_mut(&pid)?.threads.get_mut(&tid)
    }

    pub fn remove_cpu(&mut self, number: u32) {
        self.cpus.remove(&number);
    }

    pub fn remove_thread(&mut self, pid: i32, tid: i32) {
        if let Some(process) = self.processes.get_mut(&pid) {
            process.threads.remove(&tid);
        }
    }

    pub fn remove_process(&mut self, pid: i32) {
        self.processes.remove(&pid);
    }
}
