use std::fmt;

/// One sample emitted by `perf script`: a header line plus the stack frames
/// that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Process command name as shown by perf. May contain spaces.
    pub command: String,
    pub pid: i32,
    pub tid: i32,
    pub cpu: u32,
    /// The perf-reported timestamp in milliseconds.
    pub time_msec: f64,
    /// The sample count between the timestamp and the event name, or `-1`
    /// when the column is absent.
    pub time_property: i64,
    /// E.g. `cycles` or `sched_switch`.
    pub event_name: String,
    /// The trimmed remainder of the header line after the event name.
    pub event_detail: String,
    /// Deepest callee first; ends with one `Thread` frame and one `Process`
    /// frame, appended by the parser.
    pub frames: Vec<Frame>,
    /// Sample weight. The parser leaves this at `0.0`; a downstream pass may
    /// assign weights once the whole stream has been seen.
    pub period: f64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Cpu,
    /// A `sched_switch` tracepoint sample, with the decoded switch payload.
    Scheduler(ScheduleSwitch),
}

/// The payload of a `sched_switch` event:
/// `prev_comm=… prev_pid=… prev_prio=… prev_state=? ==> next_comm=…
/// next_pid=… next_prio=…`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSwitch {
    pub previous_command: String,
    pub previous_tid: i32,
    pub previous_priority: i32,
    pub previous_state: char,
    pub next_command: String,
    pub next_tid: i32,
    pub next_priority: i32,
}

/// A single entry in an event's stack. The set of frame shapes is closed;
/// the display forms below are what a stack renderer shows for each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A real stack frame from the trace. Displays as `module!symbol`.
    Stack {
        /// The frame's address, as the hex string from the trace.
        address: String,
        /// Module base name; never contains `/` or `\`.
        module: String,
        symbol: String,
    },
    /// Synthetic per-thread frame appended at the root of every stack.
    /// Displays as `name (id)`.
    Thread { id: i32, name: String },
    /// Synthetic per-process frame appended after the thread frame.
    /// Displays as `name`.
    Process { name: String },
    /// Reserved for downstream passes that split time into on-CPU/blocked
    /// portions; the parser itself never produces it. Displays as `kind`.
    BlockedCpu { id: i32, kind: String },
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Stack { module, symbol, .. } => write!(f, "{module}!{symbol}"),
            Frame::Thread { id, name } => write!(f, "{name} ({id})"),
            Frame::Process { name } => write!(f, "{name}"),
            Frame::BlockedCpu { kind, .. } => write!(f, "{kind}"),
        }
    }
}
