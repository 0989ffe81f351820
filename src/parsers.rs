//! Line grammar for the ftrace / `perf` textual event stream.
//!
//! A trace is a newline-separated sequence of records. Each significant line
//! carries a task label, the logging CPU, a timestamp in seconds, an event
//! name and an event-specific payload. Timestamps are scaled to microseconds
//! at parse time.

use std::sync::LazyLock;

const US_PER_SEC: f64 = 1_000_000.0;

// NB: 4294967295/-1 means an exit from the current state
const CPU_IDLE_EXIT_SENTINEL: i64 = 4_294_967_295;

// Matches the generic trace record:
//          <idle>-0     [001]  1.23: sched_switch: ...
static LINE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^\s*(.+?)\s+\[(\d+)\]\s*(\d+\.\d+):\s+(\S+):\s(.*)$")
        .expect("Failed to compile regex")
});

// Matches the sched_switch payload
static SCHED_SWITCH_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"prev_comm=(.+) prev_pid=(\d+) prev_prio=(\d+) prev_state=(\S) ==> next_comm=(.+) next_pid=(\d+) next_prio=(\d+)",
    )
    .expect("Failed to compile regex")
});

// Matches the sched_wakeup payload. Older kernels append success= and
// target_cpu= fields; those are tolerated but not required.
static SCHED_WAKEUP_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"comm=(.+) pid=(\d+) prio=(\d+)").expect("Failed to compile regex")
});

// Matches the power_start and power_frequency payloads (both deprecated)
static POWER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"type=(\d+) state=(\d+) cpu_id=(\d+)").expect("Failed to compile regex")
});

// Matches the cpu_frequency and cpu_idle payloads
static CPU_STATE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"state=(\d+) cpu_id=(\d+)").expect("Failed to compile regex")
});

// Matches the workqueue_execute_start payload:
//  workqueue_execute_start: work struct c7a8a89c: function MISRWrapper
static WORKQUEUE_START_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"work struct (\S+): function (\S+)").expect("Failed to compile regex")
});

// Matches the workqueue_execute_end payload:
//  workqueue_execute_end: work struct c7a8a89c
static WORKQUEUE_END_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"work struct (\S+)").expect("Failed to compile regex"));

static GEM_PWRITE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"obj=(.+), offset=(\d+), len=(\d+)").expect("Failed to compile regex")
});

static FLIP_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"plane=(\d+), obj=(.+)").expect("Failed to compile regex"));

// Matches the trace_event_clock_sync payload:
//  tracing_mark_write: trace_event_clock_sync: parent_ts=19581477508
static CLOCK_SYNC_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"trace_event_clock_sync: parent_ts=(\d+\.?\d*)")
        .expect("Failed to compile regex")
});

/// One well-formed trace line, before payload classification. Borrows from
/// the input line and lives only as long as the dispatch for that line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord<'l> {
    pub task_label: &'l str,
    pub cpu: u32,
    pub timestamp_us: f64,
    pub event_name: &'l str,
    pub payload: &'l str,
}

/// Parses the generic record shape. Returns `None` for lines that do not
/// match the grammar; comments and blank lines are the caller's concern.
pub fn parse_line(line: &str) -> Option<RawRecord<'_>> {
    let caps = LINE_RE.captures(line)?;
    Some(RawRecord {
        task_label: caps.get(1)?.as_str(),
        cpu: caps[2].parse().ok()?,
        timestamp_us: caps[3].parse::<f64>().ok()? * US_PER_SEC,
        event_name: caps.get(4)?.as_str(),
        payload: caps.get(5)?.as_str(),
    })
}

/// A record payload parsed against its event's sub-grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent<'l> {
    SchedSwitch {
        prev_state: char,
        next_comm: &'l str,
        next_pid: i32,
        next_prio: i32,
    },
    SchedWakeup {
        comm: &'l str,
        pid: i32,
        prio: i32,
    },
    PowerStart {
        kind: u32,
        state: i64,
        cpu_id: u32,
    },
    PowerFrequency {
        state: i64,
        cpu_id: u32,
    },
    CpuFrequency {
        state: i64,
        cpu_id: u32,
    },
    CpuIdle {
        state: i64,
        cpu_id: u32,
    },
    WorkqueueExecuteStart {
        function: &'l str,
    },
    WorkqueueExecuteEnd,
    GemObjectPwrite {
        obj: &'l str,
        offset: i64,
        len: i64,
    },
    FlipRequest {
        plane: i64,
        obj: &'l str,
    },
    FlipComplete {
        plane: i64,
        obj: &'l str,
    },
    ClockSync {
        reference_ts_us: f64,
    },
}

/// Classification of a payload for a given event name.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'l> {
    Event(TraceEvent<'l>),
    /// Known event name, payload does not match its sub-grammar.
    Malformed,
    /// Unknown event name. Expected trace format evolution, never an error.
    Unknown,
}

pub fn parse_payload<'l>(event_name: &str, payload: &'l str) -> Payload<'l> {
    let event = match event_name {
        "sched_switch" => parse_sched_switch(payload),
        "sched_wakeup" => parse_sched_wakeup(payload),
        // NB: old-style power events, deprecated
        "power_start" => parse_power(payload).map(|(kind, state, cpu_id)| TraceEvent::PowerStart {
            kind,
            state,
            cpu_id,
        }),
        "power_frequency" => {
            parse_power(payload).map(|(_, state, cpu_id)| TraceEvent::PowerFrequency { state, cpu_id })
        }
        "cpu_frequency" => {
            parse_cpu_state(payload).map(|(state, cpu_id)| TraceEvent::CpuFrequency { state, cpu_id })
        }
        "cpu_idle" => parse_cpu_state(payload).map(|(state, cpu_id)| TraceEvent::CpuIdle {
            state: if state == CPU_IDLE_EXIT_SENTINEL { 0 } else { state },
            cpu_id,
        }),
        "workqueue_execute_start" => WORKQUEUE_START_RE.captures(payload).and_then(|caps| {
            Some(TraceEvent::WorkqueueExecuteStart {
                function: caps.get(2)?.as_str(),
            })
        }),
        "workqueue_execute_end" => WORKQUEUE_END_RE
            .captures(payload)
            .map(|_| TraceEvent::WorkqueueExecuteEnd),
        "i915_gem_object_pwrite" => parse_gem_pwrite(payload),
        "i915_flip_request" => {
            parse_flip(payload).map(|(plane, obj)| TraceEvent::FlipRequest { plane, obj })
        }
        "i915_flip_complete" => {
            parse_flip(payload).map(|(plane, obj)| TraceEvent::FlipComplete { plane, obj })
        }
        // NB: "0" is the old-style trace marker form, deprecated
        "0" | "tracing_mark_write" => parse_clock_sync(payload),
        _ => return Payload::Unknown,
    };
    match event {
        Some(event) => Payload::Event(event),
        None => Payload::Malformed,
    }
}

fn parse_sched_switch(payload: &str) -> Option<TraceEvent<'_>> {
    let caps = SCHED_SWITCH_RE.captures(payload)?;
    Some(TraceEvent::SchedSwitch {
        prev_state: caps.get(4)?.as_str().chars().next()?,
        next_comm: caps.get(5)?.as_str(),
        next_pid: caps[6].parse().ok()?,
        next_prio: caps[7].parse().ok()?,
    })
}

fn parse_sched_wakeup(payload: &str) -> Option<TraceEvent<'_>> {
    let caps = SCHED_WAKEUP_RE.captures(payload)?;
    Some(TraceEvent::SchedWakeup {
        comm: caps.get(1)?.as_str(),
        pid: caps[2].parse().ok()?,
        prio: caps[3].parse().ok()?,
    })
}

fn parse_power(payload: &str) -> Option<(u32, i64, u32)> {
    let caps = POWER_RE.captures(payload)?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

fn parse_cpu_state(payload: &str) -> Option<(i64, u32)> {
    let caps = CPU_STATE_RE.captures(payload)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn parse_gem_pwrite(payload: &str) -> Option<TraceEvent<'_>> {
    let caps = GEM_PWRITE_RE.captures(payload)?;
    Some(TraceEvent::GemObjectPwrite {
        obj: caps.get(1)?.as_str(),
        offset: caps[2].parse().ok()?,
        len: caps[3].parse().ok()?,
    })
}

fn parse_flip(payload: &str) -> Option<(i64, &str)> {
    let caps = FLIP_RE.captures(payload)?;
    Some((caps[1].parse().ok()?, caps.get(2)?.as_str()))
}

fn parse_clock_sync(payload: &str) -> Option<TraceEvent<'_>> {
    let caps = CLOCK_SYNC_RE.captures(payload)?;
    Some(TraceEvent::ClockSync {
        reference_ts_us: caps[1].parse::<f64>().ok()? * US_PER_SEC,
    })
}
