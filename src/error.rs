use thiserror::Error;

/// The error type for this crate.
///
/// A `Format` error is fatal for the event sequence: the byte at `offset`
/// did not look like the field the parser expected, and there is no way to
/// resynchronize inside a half-parsed sample. Symbol resolution misses are
/// not errors; they leave the frame's original module and symbol in place.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Expected {expected} at byte offset {offset}")]
    Format {
        expected: &'static str,
        offset: u64,
    },

    #[error("I/O error while reading the input stream: {0}")]
    Io(#[from] std::io::Error),
}
