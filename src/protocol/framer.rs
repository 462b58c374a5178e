//! Frame encoder with the fail-stop latch.

use embedded_io_async::Write;

use super::{
    error_code_text, Frame, MessageText, FATAL_TEXT, MESSAGE_TERMINATOR, TAG_DATA_ELEMENT,
    TAG_DATA_END, TAG_DATA_START, TAG_ERROR, TAG_HEARTBEAT, TAG_MESSAGE, TAG_SCHEMA,
};
use crate::sample::{Sample, Schema, MAX_SCHEMA_FIELDS, SAMPLE_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError<E> {
    /// The transport failed. Output is latched off, as after [`Framer::fail`].
    Io(E),
    /// Fail-stop already happened; nothing was written.
    Halted,
    /// Message text holds a `0x00`, which would end the frame early.
    InteriorNul,
    /// Message text was cut off at `MAX_MESSAGE_LEN`; nothing was written.
    Truncated,
}

/// Writes frames to the transport. Owns the only handle to it.
pub struct Framer<W> {
    tx: W,
    halted: bool,
}

impl<W: Write> Framer<W> {
    pub fn new(tx: W) -> Self {
        Self { tx, halted: false }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn into_inner(self) -> W {
        self.tx
    }

    /// Every frame goes out in one `write_all`. A failed write may leave
    /// the host inside a frame, so it latches the framer and makes one
    /// attempt at the fatal marker.
    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), SendError<W::Error>> {
        if self.halted {
            return Err(SendError::Halted);
        }
        match self.tx.write_all(bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Transport write failed, halting all output");
                self.halted = true;
                let _ = self.write_fatal().await;
                Err(SendError::Io(e))
            }
        }
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), SendError<W::Error>> {
        if let Frame::Message { text, .. } = frame {
            check_text(text)?;
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = encode(frame, &mut buf);
        self.write_raw(&buf[..len]).await
    }

    /// Message frame without a trailing newline.
    pub async fn send(&mut self, text: &MessageText) -> Result<(), SendError<W::Error>> {
        self.send_message(text, false).await
    }

    /// Message frame with `\n` before the terminator.
    pub async fn send_line(&mut self, text: &MessageText) -> Result<(), SendError<W::Error>> {
        self.send_message(text, true).await
    }

    async fn send_message(
        &mut self,
        text: &MessageText,
        line: bool,
    ) -> Result<(), SendError<W::Error>> {
        check_text(text)?;
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = encode_message(text, line, &mut buf);
        self.write_raw(&buf[..len]).await
    }

    pub async fn send_error_code(&mut self, code: u8) -> Result<(), SendError<W::Error>> {
        self.send_line(&error_code_text(code)).await
    }

    pub async fn data_start(&mut self) -> Result<(), SendError<W::Error>> {
        self.write_raw(&[TAG_DATA_START]).await
    }

    pub async fn data_element(&mut self, sample: &Sample) -> Result<(), SendError<W::Error>> {
        let mut buf = [0u8; 1 + SAMPLE_LEN];
        buf[0] = TAG_DATA_ELEMENT;
        buf[1..].copy_from_slice(&sample.to_wire());
        self.write_raw(&buf).await
    }

    pub async fn data_end(&mut self) -> Result<(), SendError<W::Error>> {
        self.write_raw(&[TAG_DATA_END]).await
    }

    pub async fn heartbeat(&mut self) -> Result<(), SendError<W::Error>> {
        self.write_raw(&[TAG_HEARTBEAT]).await
    }

    pub async fn schema(&mut self) -> Result<(), SendError<W::Error>> {
        self.send_frame(&Frame::Schema(Schema::local())).await
    }

    /// Fail-stop: `---ERROR---` line, ErrorMarker, then silence for good.
    ///
    /// The latch is set before anything is written, so a half-written
    /// diagnostic is never followed by more frames.
    pub async fn fail(&mut self) -> Result<(), SendError<W::Error>> {
        if self.halted {
            return Err(SendError::Halted);
        }
        error!("Fail-stop triggered, halting all output");
        self.halted = true;
        self.write_fatal().await.map_err(SendError::Io)
    }

    /// Fatal line and ErrorMarker in one write, then a flush. Bypasses the latch.
    async fn write_fatal(&mut self) -> Result<(), W::Error> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let text = MessageText::from_bytes(FATAL_TEXT.as_bytes());
        let len = encode_message(&text, true, &mut buf);
        buf[len] = TAG_ERROR;
        self.tx.write_all(&buf[..len + 1]).await?;
        self.tx.flush().await
    }
}

fn check_text<E>(text: &MessageText) -> Result<(), SendError<E>> {
    if text.is_truncated() {
        return Err(SendError::Truncated);
    }
    if text.contains_nul() {
        return Err(SendError::InteriorNul);
    }
    Ok(())
}

fn encode_message(text: &MessageText, line: bool, out: &mut [u8; MAX_FRAME_LEN]) -> usize {
    let body = text.as_bytes();
    out[0] = TAG_MESSAGE;
    let mut len = 1 + body.len();
    out[1..len].copy_from_slice(body);
    if line {
        out[len] = b'\n';
        len += 1;
    }
    out[len] = MESSAGE_TERMINATOR;
    len + 1
}

/// Encodes one frame into `out` and returns the used length.
pub fn encode(frame: &Frame, out: &mut [u8; MAX_FRAME_LEN]) -> usize {
    out[0] = frame.tag();
    match frame {
        Frame::Message { text, line } => encode_message(text, *line, out),
        Frame::DataElement(sample) => {
            out[1..1 + SAMPLE_LEN].copy_from_slice(&sample.to_wire());
            1 + SAMPLE_LEN
        }
        Frame::Schema(schema) => {
            let n = schema.codes.len();
            out[1] = schema.version;
            out[2] = n as u8;
            out[3..3 + n].copy_from_slice(&schema.codes);
            out[3 + n..5 + n].copy_from_slice(&schema.fingerprint().to_le_bytes());
            5 + n
        }
        Frame::DataStart | Frame::DataEnd | Frame::Heartbeat | Frame::ErrorMarker => 1,
    }
}

/// Largest encoded frame: a full message plus tag, newline and terminator.
pub const MAX_FRAME_LEN: usize = max(
    crate::config::MAX_MESSAGE_LEN + 3,
    max(1 + SAMPLE_LEN, 5 + MAX_SCHEMA_FIELDS),
);

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

#[cfg(test)]
pub(crate) mod sink {
    use core::convert::Infallible;
    use embedded_io_async::{ErrorKind, ErrorType, Write};

    /// Transport that keeps everything written to it.
    #[derive(Default)]
    pub struct VecSink {
        pub bytes: Vec<u8>,
        pub flushes: usize,
    }

    impl ErrorType for VecSink {
        type Error = Infallible;
    }

    impl Write for VecSink {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushes += 1;
            Ok(())
        }
    }

    /// Transport whose `fail_at`-th write call (1-based) errors without
    /// taking any bytes. Every other call goes through.
    pub struct FlakySink {
        pub bytes: Vec<u8>,
        pub writes: usize,
        pub fail_at: usize,
    }

    impl FlakySink {
        pub fn failing_at(fail_at: usize) -> Self {
            Self {
                bytes: Vec::new(),
                writes: 0,
                fail_at,
            }
        }
    }

    impl ErrorType for FlakySink {
        type Error = ErrorKind;
    }

    impl Write for FlakySink {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.writes += 1;
            if self.writes == self.fail_at {
                return Err(ErrorKind::Other);
            }
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }
    }
}
