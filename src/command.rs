//! Host → device command lines.

use crate::config::MAX_COMMAND_LEN;

/// One received command line, CR and NUL already removed.
pub type CommandLine = heapless::String<MAX_COMMAND_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Open a streaming batch.
    Start,
    /// Close the open batch.
    Stop,
    /// Emit one batch of `TEST_BATCH_LEN` samples.
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError<'a> {
    Empty,
    /// Storage commands (`LIST`, `READ <file>`, `DEL <file>`); this build has no storage.
    Unsupported(&'a str),
    Unknown(&'a str),
}

impl Command {
    /// Keywords are case-insensitive; surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Command, ParseError<'_>> {
        let line = line.trim();
        let mut words = line.split_ascii_whitespace();
        let Some(keyword) = words.next() else {
            return Err(ParseError::Empty);
        };
        let has_args = words.next().is_some();

        let is = |name: &str| keyword.eq_ignore_ascii_case(name);
        if is("LIST") || is("READ") || is("DEL") {
            return Err(ParseError::Unsupported(line));
        }
        if has_args {
            return Err(ParseError::Unknown(line));
        }
        if is("START") {
            Ok(Command::Start)
        } else if is("STOP") {
            Ok(Command::Stop)
        } else if is("TEST") {
            Ok(Command::Test)
        } else {
            Err(ParseError::Unknown(line))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    /// The line did not fit and was dropped whole.
    TooLong,
    NotUtf8,
}

/// Splits a byte stream into LF-terminated lines of at most `N` bytes.
#[derive(Debug, Default)]
pub struct LineBuffer<const N: usize> {
    buf: heapless::Vec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            overflowed: false,
        }
    }

    /// Returns a line once its LF arrives.
    pub fn push(&mut self, byte: u8) -> Option<Result<heapless::String<N>, LineError>> {
        match byte {
            b'\r' | 0 => None,
            b'\n' => {
                let bytes = core::mem::take(&mut self.buf);
                if core::mem::replace(&mut self.overflowed, false) {
                    return Some(Err(LineError::TooLong));
                }
                Some(heapless::String::from_utf8(bytes).map_err(|_| LineError::NotUtf8))
            }
            _ => {
                if self.buf.push(byte).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }
}
