//! Receiver-side demultiplexer, fed one byte at a time.
//!
//! Recovery is best effort. An unknown tag byte is reported once and the
//! following bytes are skipped until something that looks like a tag turns
//! up. Inside a payload nothing can be recognised: a DataElement that is
//! shorter than the receiver expects silently swallows the next tag.

use super::{
    is_tag, Frame, MessageText, MESSAGE_TERMINATOR, TAG_DATA_ELEMENT, TAG_DATA_END,
    TAG_DATA_START, TAG_ERROR, TAG_HEARTBEAT, TAG_MESSAGE, TAG_SCHEMA,
};
use crate::config::MAX_MESSAGE_LEN;
use crate::sample::{fingerprint, Sample, Schema, MAX_SCHEMA_FIELDS, SAMPLE_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// First byte of a run that is not a known tag.
    UnknownTag(u8),
    /// Message text longer than the receive buffer; dropped through its terminator.
    MessageOverflow,
    /// Schema frame with an impossible field count or a bad fingerprint.
    SchemaCorrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Tag,
    Message,
    Discard,
    Element,
    Schema,
    Halted,
}

// version, count, codes, fingerprint
const SCHEMA_SCRATCH: usize = 2 + MAX_SCHEMA_FIELDS + 2;
const SCRATCH_LEN: usize = if SAMPLE_LEN > SCHEMA_SCRATCH {
    SAMPLE_LEN
} else {
    SCHEMA_SCRATCH
};

pub struct FrameDecoder {
    state: State,
    // text plus an optional trailing newline
    text: heapless::Vec<u8, { MAX_MESSAGE_LEN + 1 }>,
    scratch: [u8; SCRATCH_LEN],
    filled: usize,
    expected: usize,
    skipping: bool,
    skipped: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            state: State::Tag,
            text: heapless::Vec::new(),
            scratch: [0; SCRATCH_LEN],
            filled: 0,
            expected: 0,
            skipping: false,
            skipped: 0,
        }
    }

    /// Clears everything, including the halted latch.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// True once an ErrorMarker has been seen.
    pub fn is_halted(&self) -> bool {
        self.state == State::Halted
    }

    /// Bytes thrown away while looking for a tag.
    pub fn skipped_bytes(&self) -> usize {
        self.skipped
    }

    /// True between a tag and the end of its payload.
    pub fn in_frame(&self) -> bool {
        !matches!(self.state, State::Tag | State::Halted)
    }

    pub fn feed(&mut self, byte: u8) -> Option<Result<Frame, DecodeError>> {
        match self.state {
            State::Halted => None,
            State::Tag => self.on_tag(byte),
            State::Message => self.on_message_byte(byte),
            State::Discard => {
                if byte == MESSAGE_TERMINATOR {
                    self.state = State::Tag;
                }
                None
            }
            State::Element => {
                self.scratch[self.filled] = byte;
                self.filled += 1;
                if self.filled < SAMPLE_LEN {
                    return None;
                }
                self.state = State::Tag;
                let mut raw = [0u8; SAMPLE_LEN];
                raw.copy_from_slice(&self.scratch[..SAMPLE_LEN]);
                Some(Ok(Frame::DataElement(Sample::from_wire(&raw))))
            }
            State::Schema => self.on_schema_byte(byte),
        }
    }

    /// Feeds a whole buffer, yielding every completed frame or error in order.
    pub fn decode<'a>(
        &'a mut self,
        bytes: &'a [u8],
    ) -> impl Iterator<Item = Result<Frame, DecodeError>> + 'a {
        bytes.iter().filter_map(move |&b| self.feed(b))
    }

    fn on_tag(&mut self, byte: u8) -> Option<Result<Frame, DecodeError>> {
        if !is_tag(byte) {
            self.skipped += 1;
            if self.skipping {
                return None;
            }
            self.skipping = true;
            warn!("Unexpected initial byte 0x{:02X}, resynchronizing", byte);
            return Some(Err(DecodeError::UnknownTag(byte)));
        }
        self.skipping = false;
        self.filled = 0;
        match byte {
            TAG_MESSAGE => {
                self.text.clear();
                self.state = State::Message;
                None
            }
            TAG_DATA_ELEMENT => {
                self.state = State::Element;
                None
            }
            TAG_SCHEMA => {
                self.expected = 2;
                self.state = State::Schema;
                None
            }
            TAG_DATA_START => Some(Ok(Frame::DataStart)),
            TAG_DATA_END => Some(Ok(Frame::DataEnd)),
            TAG_HEARTBEAT => Some(Ok(Frame::Heartbeat)),
            TAG_ERROR => {
                self.state = State::Halted;
                Some(Ok(Frame::ErrorMarker))
            }
            _ => None,
        }
    }

    fn on_message_byte(&mut self, byte: u8) -> Option<Result<Frame, DecodeError>> {
        if byte != MESSAGE_TERMINATOR {
            if self.text.push(byte).is_err() {
                self.state = State::Discard;
                return Some(Err(DecodeError::MessageOverflow));
            }
            return None;
        }
        self.state = State::Tag;
        let line = self.text.last() == Some(&b'\n');
        if line {
            self.text.pop();
        }
        if self.text.len() > MAX_MESSAGE_LEN {
            return Some(Err(DecodeError::MessageOverflow));
        }
        Some(Ok(Frame::Message {
            text: MessageText::from_bytes(&self.text),
            line,
        }))
    }

    fn on_schema_byte(&mut self, byte: u8) -> Option<Result<Frame, DecodeError>> {
        self.scratch[self.filled] = byte;
        self.filled += 1;
        if self.filled == 2 {
            let count = self.scratch[1] as usize;
            if count > MAX_SCHEMA_FIELDS {
                self.state = State::Tag;
                return Some(Err(DecodeError::SchemaCorrupt));
            }
            self.expected = 2 + count + 2;
        }
        if self.filled < self.expected {
            return None;
        }
        self.state = State::Tag;

        let version = self.scratch[0];
        let count = self.scratch[1] as usize;
        let codes = &self.scratch[2..2 + count];
        let announced = u16::from_le_bytes([self.scratch[2 + count], self.scratch[3 + count]]);
        if fingerprint(version, codes) != announced {
            return Some(Err(DecodeError::SchemaCorrupt));
        }
        let mut schema = Schema {
            version,
            codes: heapless::Vec::new(),
        };
        // count <= MAX_SCHEMA_FIELDS was checked above
        let _ = schema.codes.extend_from_slice(codes);
        Some(Ok(Frame::Schema(schema)))
    }
}
