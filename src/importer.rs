//! Imports the ftrace / `perf` textual event stream into a timeline model.
//!
//! Linux scheduler traces use a definition of "pid" that differs from the
//! model's: a pid in a trace line refers to a specific thread within a
//! process. This module follows the trace definition throughout.
//!
//! An import is three ordered passes over one in-memory blob: event parsing
//! (per-CPU scheduling state, pseudo threads, counters), clock alignment
//! (which may abort and roll the model back), and per-thread timeline
//! reconstruction.

pub mod clock;
pub mod pseudo;
pub mod rebuild;
pub mod sched;

use crate::importer::clock::ClockSyncRecord;
use crate::importer::pseudo::PseudoThreadState;
use crate::importer::sched::ActiveTask;
use crate::importer::sched::CpuSchedState;
use crate::model;
use crate::model::Model;
use crate::model::Slice;
use crate::model::SliceArgs;
use crate::parsers;
use crate::parsers::Payload;
use crate::parsers::RawRecord;
use crate::parsers::TraceEvent;
use compact_str::CompactString;
use compact_str::format_compact;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::collections::HashMap;

// Fixed registrations for the i915 tracepoint pairs; they have no real task
// label to derive a pid from.
const I915_GEM: &str = "i915_gem";
const I915_GEM_IDS: (i32, i32) = (0, 1);
const I915_FLIP: &str = "i915_flip";
const I915_FLIP_IDS: (i32, i32) = (0, 2);

/// Importer failure modes that are not per-line diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// An additional trace source cannot be placed on the existing model's
    /// clock without a sync marker. The model has been rolled back.
    #[error("cannot import kernel trace without a clock sync")]
    MissingClockSync,
    /// A descheduled-state code outside the known table means an invariant
    /// was broken upstream; this is not recoverable.
    #[error("unrecognized descheduled state {state:?} for task {tid}")]
    UnknownDeschedState { state: char, tid: i32 },
}

/// Returns whether the blob looks like an ftrace / `perf` text trace: either
/// the `# tracer:` marker, or a first line matching the record grammar.
pub fn can_import(text: &str) -> bool {
    if text.starts_with("# tracer:") {
        return true;
    }
    parsers::parse_line(text.lines().next().unwrap_or("")).is_some()
}

/// Entities created by the running import, so an abort can delete precisely
/// what this import added and nothing pre-existing.
#[derive(Debug, Default)]
struct CreationLog {
    cpus: Vec<u32>,
    processes: Vec<i32>,
    threads: Vec<(i32, i32)>,
}

/// One import of trace text into a model. The importer is the model's sole
/// writer for the duration of the call; there are no suspension points.
pub struct TraceImporter<'m> {
    model: &'m mut Model,
    is_additional_import: bool,
    /// Thread lookup by trace pid, pre-built from the model so slices can be
    /// attributed to threads earlier imports created.
    threads_by_linux_pid: HashMap<i32, (i32, i32)>,
    cpu_states: BTreeMap<u32, CpuSchedState>,
    pseudo_threads: BTreeMap<CompactString, PseudoThreadState>,
    clock_syncs: SmallVec<[ClockSyncRecord; 2]>,
    created: CreationLog,
    pushed_slices_to_threads: bool,
    line_number: usize,
}

impl<'m> TraceImporter<'m> {
    pub fn new(model: &'m mut Model, is_additional_import: bool) -> Self {
        let threads_by_linux_pid = model
            .all_threads()
            .map(|(pid, thread)| (thread.tid, (pid, thread.tid)))
            .collect();
        Self {
            model,
            is_additional_import,
            threads_by_linux_pid,
            cpu_states: BTreeMap::new(),
            pseudo_threads: BTreeMap::new(),
            clock_syncs: SmallVec::new(),
            created: CreationLog::default(),
            pushed_slices_to_threads: false,
            line_number: 0,
        }
    }

    /// Runs the import to completion. On `Err(MissingClockSync)` the model
    /// is unchanged apart from one summary diagnostic.
    pub fn import(mut self, text: &str) -> Result<(), ImportError> {
        self.import_cpu_data(text);
        self.align_clocks()?;
        self.push_slices_to_threads()
    }

    fn import_error(&mut self, message: std::fmt::Arguments<'_>) {
        self.model
            .import_errors
            .push(format!("Line {}: {message}", self.line_number));
    }

    fn malformed_event(&mut self, event_name: &str) {
        self.import_error(format_args!("Malformed {event_name} event"));
    }

    /// Pass 1: walk the lines and feed the per-CPU and pseudo-thread state
    /// machines. Everything that can go wrong here is a per-line diagnostic.
    fn import_cpu_data(&mut self, text: &str) {
        for (index, line) in text.lines().enumerate() {
            self.line_number = index + 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(record) = parsers::parse_line(line) else {
                self.import_error(format_args!("Unrecognized line: {line}"));
                continue;
            };
            self.ensure_cpu(record.cpu);
            match parsers::parse_payload(record.event_name, record.payload) {
                Payload::Event(event) => self.dispatch(&record, event),
                Payload::Malformed => self.malformed_event(record.event_name),
                Payload::Unknown => log::info!("unknown event {}", record.event_name),
            }
        }
    }

    fn dispatch(&mut self, record: &RawRecord<'_>, event: TraceEvent<'_>) {
        let ts = record.timestamp_us;
        match event {
            TraceEvent::SchedSwitch {
                prev_state,
                next_comm,
                next_pid,
                next_prio,
            } => self.on_sched_switch(record.cpu, ts, prev_state, next_pid, next_comm, next_prio),
            TraceEvent::SchedWakeup { comm, pid, prio } => {
                // TODO: derive runnable markers from wakeups.
                log::debug!("ignoring wakeup of {comm} (pid {pid}, prio {prio})");
            }
            TraceEvent::PowerStart { kind, state, cpu_id } => {
                if kind == 1 {
                    self.push_counter_sample(cpu_id, "C-State", ts, state);
                } else {
                    self.import_error(format_args!(
                        "Don't understand power_start events of type {kind}"
                    ));
                }
            }
            TraceEvent::PowerFrequency { state, cpu_id } => {
                self.push_counter_sample(cpu_id, "Power Frequency", ts, state);
            }
            TraceEvent::CpuFrequency { state, cpu_id } => {
                self.push_counter_sample(cpu_id, "Clock Frequency", ts, state);
            }
            TraceEvent::CpuIdle { state, cpu_id } => {
                self.push_counter_sample(cpu_id, "C-State", ts, state);
            }
            TraceEvent::WorkqueueExecuteStart { function } => {
                let label = CompactString::from(function);
                if !self.open_pseudo_interval(record.task_label, None, ts, label) {
                    self.malformed_event(record.event_name);
                }
            }
            TraceEvent::WorkqueueExecuteEnd => {
                if !self.close_pseudo_interval(record.task_label, None, ts, SliceArgs::None) {
                    self.malformed_event(record.event_name);
                }
            }
            TraceEvent::GemObjectPwrite { obj, offset, len } => {
                // Instantaneous: open and close collapse into one
                // zero-duration slice.
                let label = format_compact!("pwrite:{obj}");
                let slice = Slice {
                    color_key: model::string_color_key(&label),
                    name: label,
                    start_us: ts,
                    duration_us: 0.0,
                    args: SliceArgs::GemPwrite {
                        obj: obj.into(),
                        offset,
                        len,
                    },
                };
                self.push_pseudo_slice(I915_GEM, I915_GEM_IDS, slice);
            }
            TraceEvent::FlipRequest { plane, obj } => {
                let label = format_compact!("flip:{obj}/{plane}");
                self.open_pseudo_interval(I915_FLIP, Some(I915_FLIP_IDS), ts, label);
            }
            TraceEvent::FlipComplete { plane, obj } => {
                let args = SliceArgs::Flip {
                    obj: obj.into(),
                    plane,
                };
                self.close_pseudo_interval(I915_FLIP, Some(I915_FLIP_IDS), ts, args);
            }
            TraceEvent::ClockSync { reference_ts_us } => {
                self.clock_syncs.push(ClockSyncRecord {
                    local_ts_us: ts,
                    reference_ts_us,
                });
            }
        }
    }

    /// Lazily creates the model CPU and its scheduling state machine. Every
    /// record references a CPU, so this runs before event dispatch.
    fn ensure_cpu(&mut self, cpu_number: u32) {
        if !self.model.contains_cpu(cpu_number) {
            self.created.cpus.push(cpu_number);
            self.model.get_or_create_cpu(cpu_number);
        }
        self.cpu_states.entry(cpu_number).or_default();
    }

    fn ensure_thread(&mut self, pid: i32, tid: i32, name: &str) {
        if !self.model.contains_process(pid) {
            self.created.processes.push(pid);
        }
        let process = self.model.get_or_create_process(pid);
        if !process.threads.contains_key(&tid) {
            self.created.threads.push((pid, tid));
        }
        process.get_or_create_thread(tid).name = name.into();
    }

    fn on_sched_switch(
        &mut self,
        cpu: u32,
        timestamp_us: f64,
        prev_state: char,
        next_pid: i32,
        next_comm: &str,
        next_prio: i32,
    ) {
        let next = ActiveTask {
            pid: next_pid,
            comm: next_comm.into(),
            prio: next_prio,
            start_us: timestamp_us,
        };
        let threads_by_linux_pid = &self.threads_by_linux_pid;
        let model = &*self.model;
        let state = self.cpu_states.entry(cpu).or_default();
        let slice = state.switch_running_task(timestamp_us, prev_state, next, |pid| {
            let (ppid, tid) = *threads_by_linux_pid.get(&pid)?;
            Some(model.thread(ppid, tid)?.user_friendly_name())
        });
        if let Some(slice) = slice {
            self.model.get_or_create_cpu(cpu).slices.push(slice);
        }
    }

    /// Appends one sample to a per-CPU counter, registering the single
    /// `state` series on first use. The target CPU comes from the payload,
    /// not from the CPU that logged the record.
    fn push_counter_sample(&mut self, cpu_id: u32, counter_name: &str, timestamp_us: f64, state: i64) {
        self.ensure_cpu(cpu_id);
        let series_color = model::string_color_key(&format_compact!("{counter_name}.state"));
        let counter = self
            .model
            .get_or_create_cpu(cpu_id)
            .get_or_create_counter("", counter_name);
        if counter.series_names.is_empty() {
            counter.series_names.push("state".into());
            counter.series_colors.push(series_color);
        }
        counter.timestamps.push(timestamp_us);
        counter.samples.push(state);
    }

    /// Registry entry for the named subsystem, creating its synthetic thread
    /// on first sight. Returns `None` only when no pid can be derived from
    /// `name`.
    fn kernel_thread_entry(
        &mut self,
        name: &str,
        ids: Option<(i32, i32)>,
    ) -> Option<&mut PseudoThreadState> {
        if !self.pseudo_threads.contains_key(name) {
            let (pid, tid) = match ids {
                Some(ids) => ids,
                None => {
                    let pid = pseudo::pid_from_task_label(name)?;
                    (pid, pid)
                }
            };
            self.ensure_thread(pid, tid, name);
            self.threads_by_linux_pid.insert(pid, (pid, tid));
            self.pseudo_threads
                .insert(name.into(), PseudoThreadState::new(pid, tid));
        }
        self.pseudo_threads.get_mut(name)
    }

    fn open_pseudo_interval(
        &mut self,
        name: &str,
        ids: Option<(i32, i32)>,
        timestamp_us: f64,
        label: CompactString,
    ) -> bool {
        match self.kernel_thread_entry(name, ids) {
            Some(kthread) => {
                kthread.open_interval(timestamp_us, label);
                true
            }
            None => false,
        }
    }

    fn close_pseudo_interval(
        &mut self,
        name: &str,
        ids: Option<(i32, i32)>,
        timestamp_us: f64,
        args: SliceArgs,
    ) -> bool {
        let Some(kthread) = self.kernel_thread_entry(name, ids) else {
            return false;
        };
        let (pid, tid) = (kthread.pid, kthread.tid);
        let Some((label, start_us)) = kthread.close_interval() else {
            return true;
        };
        let slice = Slice {
            color_key: model::string_color_key(&label),
            name: label,
            start_us,
            duration_us: timestamp_us - start_us,
            args,
        };
        if let Some(thread) = self.model.thread_mut(pid, tid) {
            thread.slices.push(slice);
        }
        true
    }

    fn push_pseudo_slice(&mut self, name: &str, ids: (i32, i32), slice: Slice) {
        if self.kernel_thread_entry(name, Some(ids)).is_none() {
            return;
        }
        if let Some(thread) = self.model.thread_mut(ids.0, ids.1) {
            thread.slices.push(slice);
        }
    }

    /// Pass 2: rewrite every timestamp recorded so far by the single offset
    /// derived from the first clock sync marker. Applied exactly once, to
    /// the full set of recorded state; a partially shifted model is never
    /// observable.
    fn align_clocks(&mut self) -> Result<(), ImportError> {
        let first_sync = self.clock_syncs.first().copied();
        let Some(sync) = first_sync else {
            // Without a sync marker an additional trace source cannot be
            // placed on the existing model's clock.
            if self.is_additional_import {
                self.abort_import();
                return Err(ImportError::MissingClockSync);
            }
            return Ok(());
        };
        let Some(shift) = sync.time_shift() else {
            return Ok(());
        };
        for cpu_number in self.cpu_states.keys() {
            let Some(cpu) = self.model.cpus.get_mut(cpu_number) else {
                continue;
            };
            for slice in &mut cpu.slices {
                slice.start_us += shift;
            }
            for counter in cpu.counters.values_mut() {
                for timestamp in &mut counter.timestamps {
                    *timestamp += shift;
                }
            }
        }
        for kthread in self.pseudo_threads.values() {
            if let Some(thread) = self.model.thread_mut(kthread.pid, kthread.tid) {
                for slice in &mut thread.slices {
                    slice.start_us += shift;
                }
            }
        }
        Ok(())
    }

    /// Rolls back everything this import added to the model. Only legal
    /// before the per-thread timelines have been built.
    fn abort_import(&mut self) {
        assert!(
            !self.pushed_slices_to_threads,
            "abort after thread timelines were built"
        );
        for cpu_number in &self.created.cpus {
            self.model.remove_cpu(*cpu_number);
        }
        for (pid, tid) in &self.created.threads {
            self.model.remove_thread(*pid, *tid);
        }
        for pid in &self.created.processes {
            self.model.remove_process(*pid);
        }
        self.model
            .import_errors
            .push("Cannot import kernel trace without a clock sync.".to_string());
    }

    /// Pass 3: project each CPU's slices onto the threads that owned them
    /// and synthesize the gapless per-thread timelines. Slices for tasks
    /// the model does not know are dropped; an untraced thread is not
    /// interesting to the consumer.
    fn push_slices_to_threads(&mut self) -> Result<(), ImportError> {
        self.pushed_slices_to_threads = true;

        let mut pending: BTreeMap<(i32, i32), Vec<Slice>> = BTreeMap::new();
        for cpu_number in self.cpu_states.keys() {
            let Some(cpu) = self.model.cpus.get(cpu_number) else {
                continue;
            };
            for slice in &cpu.slices {
                let SliceArgs::Sched { tid, .. } = &slice.args else {
                    continue;
                };
                let Some(key) = self.threads_by_linux_pid.get(tid) else {
                    continue;
                };
                pending.entry(*key).or_default().push(slice.clone());
            }
        }

        for ((pid, tid), slices) in pending {
            let timeline = rebuild::build_thread_timeline(slices)?;
            if let Some(thread) = self.model.thread_mut(pid, tid) {
                thread.cpu_slices = timeline;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn import(model: &mut Model, text: &str) -> Result<(), ImportError> {
        TraceImporter::new(model, false).import(text)
    }

    #[test]
    fn test_can_import() {
        assert!(can_import("# tracer: nop\n"));
        assert!(can_import(
            "<idle>-0 [001] 4.153254: sched_wakeup: comm=pdflush pid=31 prio=120 success=1 target_cpu=001\n"
        ));
        assert!(!can_import("not a trace"));
        assert!(!can_import(""));
    }

    #[test]
    fn test_import_creates_cpu_slices_from_sched_switch() {
        let text = indoc! {"
            perf-3269 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=perf next_pid=3269 next_prio=120
            swapper-0 [000] 2.000000: sched_switch: prev_comm=perf prev_pid=3269 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();

        let cpu = &model.cpus[&0];
        assert_eq!(cpu.slices.len(), 1);
        let slice = &cpu.slices[0];
        assert_eq!(slice.name, "perf");
        assert_eq!(slice.start_us, 1_000_000.0);
        assert_eq!(slice.duration_us, 1_000_000.0);
        assert_eq!(
            slice.args,
            SliceArgs::Sched {
                comm: "perf".into(),
                tid: 3269,
                prio: 120,
                state_when_descheduled: 'S',
            }
        );
        assert!(model.import_errors.is_empty());
    }

    #[test]
    fn test_reconstruction_builds_gapless_thread_timeline() {
        let text = indoc! {"
            worker-7 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=7 next_prio=120
            swapper-0 [000] 2.000000: sched_switch: prev_comm=worker prev_pid=7 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
            worker-7 [000] 3.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=7 next_prio=120
            swapper-0 [000] 4.000000: sched_switch: prev_comm=worker prev_pid=7 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
        "};
        let mut model = Model::default();
        model.get_or_create_process(7).get_or_create_thread(7).name = "worker".into();
        import(&mut model, text).unwrap();

        // The model knows tid 7, so its slices resolve to the thread name.
        assert_eq!(model.cpus[&0].slices[0].name, "worker");

        let thread = model.thread(7, 7).unwrap();
        let spans: Vec<_> = thread
            .cpu_slices
            .iter()
            .map(|slice| (slice.name.as_str(), slice.start_us, slice.duration_us))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("Running", 1_000_000.0, 1_000_000.0),
                ("Sleeping", 2_000_000.0, 1_000_000.0),
                ("Running", 3_000_000.0, 1_000_000.0),
            ]
        );
    }

    #[test]
    fn test_threads_unknown_to_the_model_get_no_timeline() {
        let text = indoc! {"
            worker-7 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=7 next_prio=120
            swapper-0 [000] 2.000000: sched_switch: prev_comm=worker prev_pid=7 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();
        // The CPU slice exists, but no thread received a timeline.
        assert_eq!(model.cpus[&0].slices.len(), 1);
        assert!(model.processes.is_empty());
    }

    #[test]
    fn test_unknown_desched_state_fails_import() {
        let text = indoc! {"
            worker-7 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=7 next_prio=120
            swapper-0 [000] 2.000000: sched_switch: prev_comm=worker prev_pid=7 prev_prio=120 prev_state=Q ==> next_comm=swapper next_pid=0 next_prio=120
            worker-7 [000] 3.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=7 next_prio=120
            swapper-0 [000] 4.000000: sched_switch: prev_comm=worker prev_pid=7 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
        "};
        let mut model = Model::default();
        model.get_or_create_process(7).get_or_create_thread(7);
        let result = import(&mut model, text);
        assert!(matches!(
            result,
            Err(ImportError::UnknownDeschedState { state: 'Q', tid: 7 })
        ));
    }

    #[test]
    fn test_clock_sync_shifts_all_timestamps() {
        let text = indoc! {"
            worker-100 [000] 2.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=100 next_prio=120
            worker-100 [000] 2.250000: cpu_frequency: state=1600000 cpu_id=0
            swapper-0 [000] 3.000000: sched_switch: prev_comm=worker prev_pid=100 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
            kworker/0:1-51 [000] 3.250000: workqueue_execute_start: work struct abc: function flush_to_ldisc
            kworker/0:1-51 [000] 3.500000: workqueue_execute_end: work struct abc
            <idle>-0 [000] 4.000000: tracing_mark_write: trace_event_clock_sync: parent_ts=4.5
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();

        // parent_ts 4.5s vs local 4.0s: everything shifts by +0.5s.
        let slice = &model.cpus[&0].slices[0];
        assert_eq!(slice.start_us, 2_500_000.0);
        assert_eq!(slice.duration_us, 1_000_000.0);

        let counter = &model.cpus[&0].counters["Clock Frequency"];
        assert_eq!(counter.timestamps, vec![2_750_000.0]);
        assert_eq!(counter.samples, vec![1_600_000]);

        let kthread = model.thread(51, 51).unwrap();
        assert_eq!(kthread.slices[0].start_us, 3_750_000.0);
        assert_eq!(kthread.slices[0].duration_us, 250_000.0);
    }

    #[test]
    fn test_clock_sync_with_matching_clocks_is_a_noop() {
        let text = indoc! {"
            worker-100 [000] 2.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=100 next_prio=120
            swapper-0 [000] 3.000000: sched_switch: prev_comm=worker prev_pid=100 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
            <idle>-0 [000] 3.500000: tracing_mark_write: trace_event_clock_sync: parent_ts=3.5
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();
        assert_eq!(model.cpus[&0].slices[0].start_us, 2_000_000.0);
    }

    #[test]
    fn test_first_import_without_sync_succeeds() {
        let text = indoc! {"
            worker-100 [000] 2.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=100 next_prio=120
            swapper-0 [000] 3.000000: sched_switch: prev_comm=worker prev_pid=100 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();
        assert_eq!(model.cpus[&0].slices.len(), 1);
        assert!(model.import_errors.is_empty());
    }

    #[test]
    fn test_additional_import_without_sync_rolls_back() {
        let first = indoc! {"
            worker-100 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=100 next_prio=120
        "};
        let additional = indoc! {"
            worker-10 [001] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=10 next_prio=120
            kworker/1:1-51 [001] 1.500000: workqueue_execute_start: work struct c7a8a89c: function commit_work
        "};
        let mut model = Model::default();
        import(&mut model, first).unwrap();
        let before = model.clone();

        let result = TraceImporter::new(&mut model, true).import(additional);
        assert!(matches!(result, Err(ImportError::MissingClockSync)));

        // Membership is untouched: the CPU, process and thread the failed
        // import created are gone again.
        let cpus: Vec<_> = model.cpus.keys().copied().collect();
        let before_cpus: Vec<_> = before.cpus.keys().copied().collect();
        assert_eq!(cpus, before_cpus);
        let pids: Vec<_> = model.processes.keys().copied().collect();
        let before_pids: Vec<_> = before.processes.keys().copied().collect();
        assert_eq!(pids, before_pids);

        assert_eq!(model.import_errors.len(), before.import_errors.len() + 1);
        assert_eq!(
            model.import_errors.last().map(String::as_str),
            Some("Cannot import kernel trace without a clock sync.")
        );
    }

    #[test]
    fn test_workqueue_slices() {
        let text = indoc! {"
            kworker/0:1-51 [000] 1.000000: workqueue_execute_start: work struct c7a8a89c: function commit_work
            kworker/0:1-51 [000] 1.500000: workqueue_execute_end: work struct c7a8a89c
            kworker/0:1-51 [000] 2.000000: workqueue_execute_end: work struct c7a8a89c
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();

        let thread = model.thread(51, 51).unwrap();
        assert_eq!(thread.name, "kworker/0:1-51");
        // The second end had nothing open and is a silent no-op.
        assert_eq!(thread.slices.len(), 1);
        assert_eq!(thread.slices[0].name, "commit_work");
        assert_eq!(thread.slices[0].start_us, 1_000_000.0);
        assert_eq!(thread.slices[0].duration_us, 500_000.0);
        assert!(model.import_errors.is_empty());
    }

    #[test]
    fn test_gem_pwrite_is_instantaneous() {
        let text = indoc! {"
            X-1 [000] 1.000000: i915_gem_object_pwrite: obj=ffff8800a88d1e00, offset=128, len=4096
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();

        let thread = model.thread(0, 1).unwrap();
        assert_eq!(thread.name, "i915_gem");
        assert_eq!(thread.slices.len(), 1);
        let slice = &thread.slices[0];
        assert_eq!(slice.name, "pwrite:ffff8800a88d1e00");
        assert_eq!(slice.duration_us, 0.0);
        assert_eq!(
            slice.args,
            SliceArgs::GemPwrite {
                obj: "ffff8800a88d1e00".into(),
                offset: 128,
                len: 4096,
            }
        );
    }

    #[test]
    fn test_flip_request_complete_pair() {
        let text = indoc! {"
            X-1 [000] 1.000000: i915_flip_request: plane=0, obj=ffff8800a88d1e00
            X-1 [000] 1.500000: i915_flip_complete: plane=0, obj=ffff8800a88d1e00
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();

        let thread = model.thread(0, 2).unwrap();
        assert_eq!(thread.name, "i915_flip");
        assert_eq!(thread.slices.len(), 1);
        let slice = &thread.slices[0];
        assert_eq!(slice.name, "flip:ffff8800a88d1e00/0");
        assert_eq!(slice.start_us, 1_000_000.0);
        assert_eq!(slice.duration_us, 500_000.0);
        assert_eq!(
            slice.args,
            SliceArgs::Flip {
                obj: "ffff8800a88d1e00".into(),
                plane: 0,
            }
        );
    }

    #[test]
    fn test_counter_samples() {
        let text = indoc! {"
            <idle>-0 [000] 1.000000: power_start: type=1 state=2 cpu_id=0
            <idle>-0 [000] 1.250000: cpu_idle: state=4294967295 cpu_id=0
            <idle>-0 [003] 1.500000: cpu_frequency: state=800000 cpu_id=2
            <idle>-0 [000] 1.750000: power_start: type=9 state=1 cpu_id=0
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();

        let c_state = &model.cpus[&0].counters["C-State"];
        assert_eq!(c_state.series_names, vec!["state"]);
        assert_eq!(c_state.timestamps, vec![1_000_000.0, 1_250_000.0]);
        // The idle exit sentinel records as zero.
        assert_eq!(c_state.samples, vec![2, 0]);

        // Counter samples land on the payload's cpu_id, not the logging CPU.
        let frequency = &model.cpus[&2].counters["Clock Frequency"];
        assert_eq!(frequency.samples, vec![800_000]);
        assert!(model.contains_cpu(3));

        assert_eq!(
            model.import_errors,
            vec!["Line 4: Don't understand power_start events of type 9"]
        );
    }

    #[test]
    fn test_malformed_and_unrecognized_lines_are_diagnostics() {
        let text = indoc! {"
            this is not a trace record
            worker-1 [000] 1.000000: sched_switch: garbage payload
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();
        assert_eq!(
            model.import_errors,
            vec![
                "Line 1: Unrecognized line: this is not a trace record",
                "Line 2: Malformed sched_switch event",
            ]
        );
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        let text = indoc! {"
            worker-1 [000] 1.000000: sched_process_fork: comm=worker pid=1 child_comm=worker child_pid=2
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();
        assert!(model.import_errors.is_empty());
        // The CPU is still registered; only the event itself is skipped.
        assert!(model.contains_cpu(0));
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let text = indoc! {"
            # tracer: nop
            #
            worker-100 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=100 next_prio=120

            swapper-0 [000] 2.000000: sched_switch: prev_comm=worker prev_pid=100 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
        "};
        let mut model = Model::default();
        import(&mut model, text).unwrap();
        assert_eq!(model.cpus[&0].slices.len(), 1);
        assert!(model.import_errors.is_empty());
    }

    #[test]
    fn test_identical_imports_yield_identical_models() {
        let text = indoc! {"
            worker-7 [000] 1.000000: sched_switch: prev_comm=swapper prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=worker next_pid=7 next_prio=120
            swapper-0 [000] 2.000000: sched_switch: prev_comm=worker prev_pid=7 prev_prio=120 prev_state=S ==> next_comm=swapper next_pid=0 next_prio=120
            kworker/0:1-51 [000] 2.250000: workqueue_execute_start: work struct abc: function flush_to_ldisc
            kworker/0:1-51 [000] 2.500000: workqueue_execute_end: work struct abc
            <idle>-0 [000] 3.000000: tracing_mark_write: trace_event_clock_sync: parent_ts=3.5
        "};
        let mut first = Model::default();
        import(&mut first, text).unwrap();
        let mut second = Model::default();
        import(&mut second, text).unwrap();
        assert_eq!(first, second);
    }
}
