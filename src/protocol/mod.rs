//! Tagged-frame serial protocol.
//!
//! Every frame starts with one tag byte. Only two kinds carry a payload
//! whose extent is not implied by the tag:
//!
//! * `Message`: text terminated by a single `0x00`, optionally preceded by `\n`.
//! * `Schema`: `version, count, count × kind code, fingerprint (u16 LE)`.
//!
//! `DataElement` is followed by exactly [`SAMPLE_LEN`](crate::sample::SAMPLE_LEN)
//! bytes, so both ends must agree on the record layout (see [`Frame::Schema`]).
//! There is no length prefix and no checksum on Message or DataElement frames;
//! a NUL inside message text would end the frame early, which is why the
//! encoder refuses such text instead of rewriting it.

pub mod decoder;
pub mod framer;

pub use decoder::{DecodeError, FrameDecoder};
pub use framer::{Framer, SendError};

use core::fmt;

use crate::config::MAX_MESSAGE_LEN;
use crate::sample::{Sample, Schema};

/* ────────────────── Tag bytes ─────────────────── */
pub const TAG_MESSAGE: u8 = 0;
pub const TAG_DATA_START: u8 = 1;
pub const TAG_DATA_ELEMENT: u8 = 2;
pub const TAG_DATA_END: u8 = 3;
pub const TAG_SCHEMA: u8 = 4;
pub const TAG_HEARTBEAT: u8 = 250;
pub const TAG_ERROR: u8 = 255;

pub const MESSAGE_TERMINATOR: u8 = 0;

/// Fixed text of the fail-stop diagnostic.
pub const FATAL_TEXT: &str = "---ERROR---";
pub const ERROR_CODE_PREFIX: &str = "  Error: 0x";

pub fn is_tag(byte: u8) -> bool {
    matches!(
        byte,
        TAG_MESSAGE
            | TAG_DATA_START
            | TAG_DATA_ELEMENT
            | TAG_DATA_END
            | TAG_SCHEMA
            | TAG_HEARTBEAT
            | TAG_ERROR
    )
}

/// Bounded message payload. Text past capacity is cut off and flags the
/// payload as truncated; later appends are ignored. The framer refuses to
/// send truncated text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageText {
    bytes: heapless::Vec<u8, MAX_MESSAGE_LEN>,
    truncated: bool,
}

impl MessageText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut text = Self::new();
        text.push_bytes(bytes);
        text
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> Result<&str, core::str::Utf8Error> {
        core::str::from_utf8(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Appends as much of `bytes` as fits; false once the text is truncated.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.truncated {
            return false;
        }
        let room = self.bytes.capacity() - self.bytes.len();
        let (head, rest) = bytes.split_at(bytes.len().min(room));
        // cannot fail, `head` fits
        let _ = self.bytes.extend_from_slice(head);
        if !rest.is_empty() {
            self.truncated = true;
        }
        !self.truncated
    }

    pub fn contains_nul(&self) -> bool {
        self.bytes.contains(&MESSAGE_TERMINATOR)
    }
}

impl fmt::Write for MessageText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.push_bytes(s.as_bytes()) {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MessageText {
    fn format(&self, f: defmt::Formatter) {
        match self.as_str() {
            Ok(s) => defmt::write!(f, "{=str}", s),
            Err(_) => defmt::write!(f, "{=[u8]}", self.as_bytes()),
        }
    }
}

/// Builds a [`MessageText`] from the `Display` rendering of each argument, in order.
///
/// ```
/// let text = kos_daq::message!("rate: ", 500, " Hz");
/// assert_eq!(text.as_str(), Ok("rate: 500 Hz"));
/// ```
#[macro_export]
macro_rules! message {
    ($($arg:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut text = $crate::protocol::MessageText::new();
        $(
            let _ = ::core::fmt::Write::write_fmt(&mut text, format_args!("{}", $arg));
        )*
        text
    }};
}

/// `"  Error: 0x"` followed by two uppercase hex digits.
pub fn error_code_text(code: u8) -> MessageText {
    message!(ERROR_CODE_PREFIX, HexByte(code))
}

struct HexByte(u8);

impl fmt::Display for HexByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// One unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// `line` = a `\n` sits just before the terminator (not part of `text`).
    Message { text: MessageText, line: bool },
    DataStart,
    DataElement(Sample),
    DataEnd,
    Schema(Schema),
    Heartbeat,
    ErrorMarker,
}

impl Frame {
    pub fn tag(&self) -> u8 {
        match self {
            Frame::Message { .. } => TAG_MESSAGE,
            Frame::DataStart => TAG_DATA_START,
            Frame::DataElement(_) => TAG_DATA_ELEMENT,
            Frame::DataEnd => TAG_DATA_END,
            Frame::Schema(_) => TAG_SCHEMA,
            Frame::Heartbeat => TAG_HEARTBEAT,
            Frame::ErrorMarker => TAG_ERROR,
        }
    }

    pub fn text(text: &str) -> Self {
        Frame::Message {
            text: MessageText::from_bytes(text.as_bytes()),
            line: false,
        }
    }

    pub fn line(text: &str) -> Self {
        Frame::Message {
            text: MessageText::from_bytes(text.as_bytes()),
            line: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_macro_concatenates_display_output() {
        let text = message!("IMU ", 3, " ok ", -1.5, ' ', true);
        assert_eq!(text.as_str(), Ok("IMU 3 ok -1.5 true"));
        assert!(!text.is_truncated());
        assert!(message!().is_empty());
    }

    #[test]
    fn message_overflow_cuts_and_stops_appending() {
        let long = [b'x'; MAX_MESSAGE_LEN];
        let long = core::str::from_utf8(&long).unwrap();
        let text = message!("ab", long, "cd");
        assert!(text.is_truncated());
        assert_eq!(text.len(), MAX_MESSAGE_LEN);
        assert!(text.as_bytes().starts_with(b"abxx"));
        assert!(text.as_bytes().ends_with(b"xx"));

        // Exactly full is not truncated
        let text = message!(long);
        assert!(!text.is_truncated());
        assert_eq!(text.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn error_code_is_two_uppercase_digits() {
        assert_eq!(error_code_text(0x0A).as_str(), Ok("  Error: 0x0A"));
        assert_eq!(error_code_text(0x00).as_str(), Ok("  Error: 0x00"));
        assert_eq!(error_code_text(0xFF).as_str(), Ok("  Error: 0xFF"));
    }

    #[test]
    fn tag_catalog() {
        let tags: Vec<u8> = (0..=255u8).filter(|&b| is_tag(b)).collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4, 250, 255]);
        assert_eq!(Frame::Heartbeat.tag(), 250);
        assert_eq!(Frame::ErrorMarker.tag(), 255);
        assert_eq!(Frame::line("x").tag(), 0);
    }
}
