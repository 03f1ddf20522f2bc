use std::io::Read;

use regex::Regex;

use crate::cursor::ByteCursor;
use crate::error::Error;
use crate::event::{Event, EventKind, Frame};
use crate::frame_line::read_stack_frame;
use crate::sched_switch::read_schedule_switch;
use crate::symbol_index::{SymbolArchive, SymbolIndex};

const DEFAULT_MAX_EVENTS: u64 = 50_000;

/// Streaming reader for `perf script` textual output.
///
/// Events are parsed one at a time from the underlying byte stream; nothing
/// is buffered beyond the line being parsed. Pull events with
/// [`next_event`](PerfScriptReader::next_event), or use the reader as an
/// iterator of `Result<Event, Error>`.
///
/// A format error is fatal: it is returned once and the sequence ends.
pub struct PerfScriptReader<R: Read> {
    cursor: ByteCursor<R>,
    symbols: Option<SymbolIndex>,
    event_name_filter: Option<Regex>,
    max_events: u64,
    event_count: u64,
    scratch: Vec<u8>,
    preamble_skipped: bool,
    finished: bool,
}

impl<R: Read> PerfScriptReader<R> {
    /// Create a reader, skipping a UTF-8 byte-order mark if present.
    pub fn new(reader: R) -> Result<Self, Error> {
        let mut parser = Self::new_without_bom_skip(reader)?;
        let cursor = &mut parser.cursor;
        if cursor.current() == 0xEF && cursor.peek(1)? == 0xBB && cursor.peek(2)? == 0xBF {
            cursor.advance()?;
            cursor.advance()?;
            cursor.advance()?;
        }
        Ok(parser)
    }

    /// Create a reader that starts parsing at the first byte as-is.
    pub fn new_without_bom_skip(reader: R) -> Result<Self, Error> {
        Ok(PerfScriptReader {
            cursor: ByteCursor::new(reader)?,
            symbols: None,
            event_name_filter: None,
            max_events: DEFAULT_MAX_EVENTS,
            event_count: 0,
            scratch: Vec::new(),
            preamble_skipped: false,
            finished: false,
        })
    }

    /// Install a symbol index; from now on, frames whose module or symbol is
    /// `unknown` get a resolution attempt against it.
    pub fn set_symbol_index(&mut self, index: SymbolIndex) {
        self.symbols = Some(index);
    }

    /// Build a [`SymbolIndex`] from `archive` and install it.
    pub fn set_symbol_archive<A: SymbolArchive + ?Sized>(
        &mut self,
        archive: &mut A,
    ) -> Result<(), Error> {
        self.symbols = Some(SymbolIndex::from_archive(archive)?);
        Ok(())
    }

    /// Only emit events whose event name matches `filter`. Filtered-out
    /// events are consumed but neither yielded nor counted. `None` matches
    /// everything.
    pub fn set_event_name_filter(&mut self, filter: Option<Regex>) {
        self.event_name_filter = filter;
    }

    /// Stop the sequence once more than `max_events` events have been
    /// emitted. Defaults to 50 000.
    pub fn set_max_events(&mut self, max_events: u64) {
        self.max_events = max_events;
    }

    /// Number of events emitted so far.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Parse and return the next event, or `Ok(None)` at the end of the
    /// stream (or once the event cap has been exceeded).
    pub fn next_event(&mut self) -> Result<Option<Event>, Error> {
        if self.finished {
            return Ok(None);
        }
        match self.next_unfiltered_event() {
            Ok(Some(event)) => {
                self.event_count += 1;
                if self.event_count > self.max_events {
                    self.finished = true;
                }
                Ok(Some(event))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(error) => {
                self.finished = true;
                Err(error)
            }
        }
    }

    fn next_unfiltered_event(&mut self) -> Result<Option<Event>, Error> {
        if !self.preamble_skipped {
            self.skip_preamble()?;
            self.preamble_skipped = true;
        }
        loop {
            self.cursor.skip_whitespace()?;
            if self.cursor.end_of_stream() || self.cursor.current() == 0 {
                return Ok(None);
            }
            match self.parse_event()? {
                Some(event) => return Ok(Some(event)),
                None => continue,
            }
        }
    }

    /// Comment lines (`#`) only appear before the first sample.
    fn skip_preamble(&mut self) -> Result<(), Error> {
        self.cursor.skip_whitespace()?;
        while self.cursor.current() == b'#' {
            self.cursor.skip_until(b'\n')?;
            self.cursor.skip_whitespace()?;
        }
        Ok(())
    }

    /// Parse one sample. Returns `None` if the event name filter rejected
    /// it (the sample is consumed either way).
    fn parse_event(&mut self) -> Result<Option<Event>, Error> {
        // The command may contain spaces, but no token of it starts with a
        // digit; the first digit-leading token is the pid.
        let mut command = String::new();
        loop {
            self.scratch.clear();
            self.cursor
                .read_while(|b| !b.is_ascii_whitespace() && b != 0, &mut self.scratch)?;
            if self.scratch.is_empty() {
                return Err(Error::Format {
                    expected: "event header",
                    offset: self.cursor.offset(),
                });
            }
            if !command.is_empty() {
                command.push(' ');
            }
            command.push_str(&String::from_utf8_lossy(&self.scratch));
            self.cursor.skip_whitespace()?;
            if self.cursor.current().is_ascii_digit() {
                break;
            }
            if self.cursor.end_of_stream() || self.cursor.current() == 0 {
                return Err(Error::Format {
                    expected: "pid after the command",
                    offset: self.cursor.offset(),
                });
            }
        }

        let pid = self.cursor.read_decimal_i32()?;
        self.cursor.expect(b'/', "'/' between pid and tid")?;
        let tid = self.cursor.read_decimal_i32()?;
        self.cursor.skip_whitespace()?;
        self.cursor.expect(b'[', "'[' before the cpu number")?;
        let cpu_offset = self.cursor.offset();
        let cpu = u32::try_from(self.cursor.read_decimal_i32()?).map_err(|_| Error::Format {
            expected: "non-negative cpu number",
            offset: cpu_offset,
        })?;
        self.cursor.expect(b']', "']' after the cpu number")?;
        self.cursor.skip_whitespace()?;

        let seconds_offset = self.cursor.offset();
        self.scratch.clear();
        self.cursor
            .read_while(|b| b != b':' && b != b'\n' && b != 0, &mut self.scratch)?;
        let seconds: f64 = std::str::from_utf8(&self.scratch)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or(Error::Format {
                expected: "timestamp in seconds",
                offset: seconds_offset,
            })?;
        let time_msec = seconds * 1000.0;
        self.cursor.expect(b':', "':' after the timestamp")?;
        self.cursor.skip_whitespace()?;

        let time_property = if self.cursor.current().is_ascii_digit() {
            self.cursor.read_decimal_i64()?
        } else {
            -1
        };
        self.cursor.skip_whitespace()?;

        self.scratch.clear();
        self.cursor
            .read_while(|b| b != b':' && b != b'\n' && b != 0, &mut self.scratch)?;
        let event_name = String::from_utf8_lossy(&self.scratch).trim().to_string();
        self.cursor.expect(b':', "':' after the event name")?;

        // One lookahead: the rest of the header line decides the event kind
        // before we know whether to parse it as a scheduler payload.
        self.cursor.set_mark();
        self.scratch.clear();
        self.cursor.read_until(b'\n', &mut self.scratch)?;
        let event_detail = String::from_utf8_lossy(&self.scratch).trim().to_string();
        // perf names the switch tracepoint either `sched_switch:` or
        // `sched:sched_switch:`; in the second form the payload starts with
        // the `sched_switch` suffix.
        let is_scheduler =
            event_name == "sched_switch" || event_detail.starts_with("sched_switch");

        if let Some(filter) = &self.event_name_filter {
            if !filter.is_match(&event_name) {
                self.cursor.clear_mark();
                self.skip_to_end_of_sample()?;
                return Ok(None);
            }
        }

        let kind = if is_scheduler {
            self.cursor.rewind_to_mark();
            let switch = read_schedule_switch(&mut self.cursor, &mut self.scratch)?;
            EventKind::Scheduler(switch)
        } else {
            self.cursor.clear_mark();
            EventKind::Cpu
        };

        let mut frames = Vec::new();
        while !self.end_of_sample()? {
            frames.push(read_stack_frame(
                &mut self.cursor,
                &mut self.scratch,
                pid,
                self.symbols.as_ref(),
            )?);
        }
        frames.push(Frame::Thread {
            id: tid,
            name: "Thread".to_string(),
        });
        frames.push(Frame::Process {
            name: command.clone(),
        });

        Ok(Some(Event {
            command,
            pid,
            tid,
            cpu,
            time_msec,
            time_property,
            event_name,
            event_detail,
            frames,
            period: 0.0,
            kind,
        }))
    }

    /// A sample ends at a blank line, a NUL byte, or the end of the stream.
    /// The cursor rests on the line break of the last consumed line.
    fn end_of_sample(&mut self) -> Result<bool, Error> {
        if self.cursor.end_of_stream() || self.cursor.current() == 0 {
            return Ok(true);
        }
        if self.cursor.current() == b'\n' {
            let next = self.cursor.peek(1)?;
            return Ok(next == b'\n' || next == b'\r' || next == 0);
        }
        Ok(false)
    }

    fn skip_to_end_of_sample(&mut self) -> Result<(), Error> {
        while !self.end_of_sample()? {
            if self.cursor.current() == b'\n' {
                self.cursor.advance()?;
            }
            self.cursor.skip_until(b'\n')?;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for PerfScriptReader<R> {
    type Item = Result<Event, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}
