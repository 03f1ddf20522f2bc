use std::io::Read;

use crate::cursor::ByteCursor;
use crate::error::Error;
use crate::event::ScheduleSwitch;

/// Parse the payload of a `sched_switch` event:
/// `prev_comm=<text> prev_pid=<i32> prev_prio=<i32> prev_state=<char> ==>
/// next_comm=<text> next_pid=<i32> next_prio=<i32>`.
///
/// Each value is found by scanning to the next `=`. The `==>` arrow is
/// consumed as a literal token. Afterwards the cursor is advanced to the
/// end of the line.
pub(crate) fn read_schedule_switch<R: Read>(
    cursor: &mut ByteCursor<R>,
    scratch: &mut Vec<u8>,
) -> Result<ScheduleSwitch, Error> {
    let previous_command = read_assigned_text(cursor, scratch)?;
    let previous_tid = read_assigned_i32(cursor)?;
    let previous_priority = read_assigned_i32(cursor)?;
    let previous_state = read_assigned_state(cursor, scratch)?;
    expect_arrow(cursor)?;
    let next_command = read_assigned_text(cursor, scratch)?;
    let next_tid = read_assigned_i32(cursor)?;
    let next_priority = read_assigned_i32(cursor)?;
    cursor.skip_until(b'\n')?;
    Ok(ScheduleSwitch {
        previous_command,
        previous_tid,
        previous_priority,
        previous_state,
        next_command,
        next_tid,
        next_priority,
    })
}

fn skip_to_value<R: Read>(cursor: &mut ByteCursor<R>) -> Result<(), Error> {
    cursor.skip_until(b'=')?;
    cursor.expect(b'=', "'=' before a sched_switch value")
}

fn read_assigned_text<R: Read>(
    cursor: &mut ByteCursor<R>,
    scratch: &mut Vec<u8>,
) -> Result<String, Error> {
    skip_to_value(cursor)?;
    scratch.clear();
    cursor.read_while(|b| !b.is_ascii_whitespace(), scratch)?;
    Ok(String::from_utf8_lossy(scratch).into_owned())
}

fn read_assigned_i32<R: Read>(cursor: &mut ByteCursor<R>) -> Result<i32, Error> {
    skip_to_value(cursor)?;
    cursor.read_decimal_i32()
}

/// `prev_state` is a single character; perf occasionally appends a
/// qualifier (`R+`), which is dropped.
fn read_assigned_state<R: Read>(
    cursor: &mut ByteCursor<R>,
    scratch: &mut Vec<u8>,
) -> Result<char, Error> {
    skip_to_value(cursor)?;
    let offset = cursor.offset();
    scratch.clear();
    cursor.read_while(|b| !b.is_ascii_whitespace(), scratch)?;
    match scratch.first() {
        Some(byte) => Ok(*byte as char),
        None => Err(Error::Format {
            expected: "scheduler state character",
            offset,
        }),
    }
}

fn expect_arrow<R: Read>(cursor: &mut ByteCursor<R>) -> Result<(), Error> {
    cursor.skip_whitespace()?;
    for byte in *b"==>" {
        cursor.expect(byte, "'==>' separator")?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(payload: &[u8]) -> ScheduleSwitch {
        let mut cursor = ByteCursor::new(payload).unwrap();
        let mut scratch = Vec::new();
        read_schedule_switch(&mut cursor, &mut scratch).unwrap()
    }

    #[test]
    fn well_formed_payload() {
        let switch = parse(
            b"prev_comm=kworker/0:1 prev_pid=17 prev_prio=120 prev_state=S ==> \
              next_comm=swapper/0 next_pid=0 next_prio=120\n",
        );
        assert_eq!(
            switch,
            ScheduleSwitch {
                previous_command: "kworker/0:1".to_string(),
                previous_tid: 17,
                previous_priority: 120,
                previous_state: 'S',
                next_command: "swapper/0".to_string(),
                next_tid: 0,
                next_priority: 120,
            }
        );
    }

    #[test]
    fn tracepoint_prefix_is_skipped() {
        let switch = parse(
            b"sched_switch: prev_comm=A prev_pid=1 prev_prio=120 prev_state=R ==> \
              next_comm=B next_pid=2 next_prio=120\n",
        );
        assert_eq!(switch.previous_command, "A");
        assert_eq!(switch.next_command, "B");
    }

    #[test]
    fn multi_character_state_keeps_the_first() {
        let switch = parse(
            b"prev_comm=x prev_pid=1 prev_prio=120 prev_state=R+ ==> \
              next_comm=y next_pid=2 next_prio=120\n",
        );
        assert_eq!(switch.previous_state, 'R');
    }

    #[test]
    fn cursor_ends_on_the_line_break() {
        let mut cursor = ByteCursor::new(
            &b"prev_comm=a prev_pid=1 prev_prio=2 prev_state=D ==> next_comm=b next_pid=3 next_prio=4 extra\nnext line"[..],
        )
        .unwrap();
        let mut scratch = Vec::new();
        read_schedule_switch(&mut cursor, &mut scratch).unwrap();
        assert_eq!(cursor.current(), b'\n');
    }

    #[test]
    fn missing_arrow_is_a_format_error() {
        let mut cursor = ByteCursor::new(
            &b"prev_comm=a prev_pid=1 prev_prio=2 prev_state=D -> next_comm=b next_pid=3 next_prio=4\n"[..],
        )
        .unwrap();
        let mut scratch = Vec::new();
        let err = read_schedule_switch(&mut cursor, &mut scratch).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }
}
