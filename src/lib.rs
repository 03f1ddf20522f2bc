//! This crate parses the textual output of the Linux `perf script` command
//! into structured sample events, and can enrich stack frames whose module
//! or symbol came out as `unknown` by consulting the `.map` symbol files
//! that ship alongside a trace.
//!
//! The main entry point is [`PerfScriptReader`], a pull-based reader over
//! any `std::io::Read` byte stream.
//!
//! # Design constraints
//!
//!  - Must stream: trace dumps are routinely hundreds of megabytes once
//!    decompressed, so the reader never buffers more than the line it is
//!    currently parsing. Events are produced lazily, one per pull.
//!  - Best effort symbolication: a failed symbol lookup is not an error.
//!    Frames keep whatever module and symbol text `perf script` printed,
//!    and are only upgraded when the side-channel files resolve them.
//!  - No opinion about containers: the side-channel symbol files usually
//!    live in some archive next to the trace. Opening that archive is the
//!    caller's business; the [`SymbolIndex`] only needs the
//!    [`SymbolArchive`] trait (named entries, readable bytes).
//!
//! # Supported input
//!
//! The event stream is what `perf script` prints: an optional UTF-8 BOM,
//! `#` comment lines, then samples consisting of a header line and an
//! indented stack, separated by blank lines. Scheduler switch samples
//! (`sched_switch`) additionally carry their tracepoint payload, which is
//! decoded into [`ScheduleSwitch`].
//!
//! Side-channel files: `perf-<pid>.map` and `<image>.ni.{<guid>}.map`
//! files with `hexStart hexSize symbol` records, and `perfinfo-<pid>.map`
//! files whose `ImageLoad` records link image basenames to build guids.
//!
//! # Example
//!
//! ```
//! use perf_script_reader::PerfScriptReader;
//!
//! # fn main() -> Result<(), perf_script_reader::Error> {
//! let text = b"firefox 1234/1234 [002] 370.417: cycles:\n\
//!     \t7f8a31 mozilla::RunTask() (/usr/lib/firefox/libxul.so)\n\n";
//! let mut reader = PerfScriptReader::new(&text[..])?;
//! while let Some(event) = reader.next_event()? {
//!     println!("{} sampled on cpu {}", event.command, event.cpu);
//!     for frame in &event.frames {
//!         println!("  {frame}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod cursor;
mod error;
mod event;
mod frame_line;
mod interval_map;
mod map_symbol;
mod parser;
mod sched_switch;
mod symbol_index;

pub use error::Error;
pub use event::{Event, EventKind, Frame, ScheduleSwitch};
pub use interval_map::{Interval, IntervalMap, IntervalMapBuilder};
pub use map_symbol::decode_map_symbol;
pub use parser::PerfScriptReader;
pub use symbol_index::{DirectoryArchive, SymbolArchive, SymbolIndex};
