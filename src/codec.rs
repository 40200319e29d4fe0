//! Stream framing for the daemon's TCP API socket.
//!
//! Every message travels in a length-prefixed frame:
//!
//! ```text
//! [0x94] [0xC3] [u16 BE length] [payload: length bytes]
//! ```
//!
//! The two magic bytes let a reader resynchronise after garbage on the
//! stream (debug text the daemon prints before the API is up, a half frame
//! from a previous client). Bytes before the magic are discarded.

use crate::error::TransportError;

/// First frame magic byte.
pub const START1: u8 = 0x94;

/// Second frame magic byte.
pub const START2: u8 = 0xC3;

/// Header length: two magic bytes and a big-endian u16 length.
pub const HEADER_LEN: usize = 4;

/// Largest payload the length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Encode `payload` into a wire frame.
///
/// # Errors
///
/// Returns `TransportError::Protocol` for empty or oversized payloads.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.is_empty() {
        return Err(TransportError::Protocol("refusing to send empty frame".into()));
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::Protocol(format!(
            "frame too large: {} bytes (max {MAX_PAYLOAD})",
            payload.len()
        )));
    }
    let len = payload.len() as u16;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(START1);
    out.push(START2);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and take complete payloads out.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl FrameDecoder {
    /// Create a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and extract all complete payloads.
    ///
    /// Incomplete data is buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Protocol` if a header announces a zero-length
    /// frame.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, TransportError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            self.resync();
            if self.buf.len() < HEADER_LEN {
                break;
            }

            let length = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            if length == 0 {
                self.buf.drain(..HEADER_LEN);
                return Err(TransportError::Protocol("zero-length frame".into()));
            }

            let total = HEADER_LEN + length;
            if self.buf.len() < total {
                break;
            }

            frames.push(self.buf[HEADER_LEN..total].to_vec());
            self.buf.drain(..total);
        }

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Total garbage bytes discarded while looking for frame magic.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Drop leading bytes until the buffer starts with the frame magic (or
    /// with a lone `START1` that may be completed by the next read).
    fn resync(&mut self) {
        let mut start = 0;
        while start < self.buf.len() {
            if self.buf[start] == START1 {
                match self.buf.get(start + 1) {
                    Some(&START2) | None => break,
                    Some(_) => {}
                }
            }
            start += 1;
        }
        if start > 0 {
            log::trace!("[codec] skipping {start} bytes before frame magic");
            self.skipped += start;
            self.buf.drain(..start);
        }
    }
}
