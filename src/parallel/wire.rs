//! Master/worker frames.
//!
//! ```text
//! len       u32 LE   length of everything below
//! kind      u8       1 = BEST, 2 = STOP
//! objective u64 LE
//! payload   ...      encoded Schedule (empty for STOP)
//! ```

use crate::error::WireError;

/// Upper bound on a frame body.
pub const MAX_BODY_LEN: usize = 64 << 20;

const PREFIX_LEN: usize = 4;
const BODY_HEADER_LEN: usize = 1 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A solution and its objective. Worker to master: a report. Master to
    /// worker: the current global best.
    Best = 1,
    /// Master to worker: finish the current epoch and exit.
    Stop = 2,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FrameKind::Best),
            2 => Ok(FrameKind::Stop),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub objective: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn best(objective: u64, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Best,
            objective,
            payload,
        }
    }

    pub fn stop() -> Self {
        Self {
            kind: FrameKind::Stop,
            objective: 0,
            payload: Vec::new(),
        }
    }

    pub fn body_len(&self) -> usize {
        BODY_HEADER_LEN + self.payload.len()
    }

    /// Fails if the body is larger than a peer accepts.
    pub fn check_len(&self) -> Result<(), WireError> {
        match self.body_len() {
            len if len > MAX_BODY_LEN => Err(WireError::Oversized(len)),
            _ => Ok(()),
        }
    }

    /// Length prefix followed by the body. Callers sending frames of
    /// unbounded size check [`Frame::check_len`] first.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = self.body_len();
        let mut out = Vec::with_capacity(PREFIX_LEN + body_len);
        out.extend_from_slice(&(body_len as u32).to_le_bytes());
        out.push(self.kind as u8);
        out.extend_from_slice(&self.objective.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parses a body (everything after the length prefix).
    pub fn decode_body(body: &[u8]) -> Result<Self, WireError> {
        if body.len() < BODY_HEADER_LEN {
            return Err(WireError::ShortBody(body.len()));
        }
        let kind = FrameKind::try_from(body[0])?;
        let mut objective = [0u8; 8];
        objective.copy_from_slice(&body[1..BODY_HEADER_LEN]);
        Ok(Self {
            kind,
            objective: u64::from_le_bytes(objective),
            payload: body[BODY_HEADER_LEN..].to_vec(),
        })
    }
}

/// Validates a length prefix and returns the body length it announces.
///
/// An oversized prefix means the stream can no longer be trusted; the
/// connection is dropped rather than resynchronized.
pub fn body_len(prefix: [u8; 4]) -> Result<usize, WireError> {
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_BODY_LEN {
        return Err(WireError::Oversized(len));
    }
    Ok(len)
}

/// Reassembles frames from a byte stream that arrives in arbitrary chunks.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed. A frame with a well-formed
    /// length but a bad body is consumed and returned as `Some(Err(_))` so
    /// the caller can skip it; an oversized prefix is returned as `Err`.
    pub fn next_frame(&mut self) -> Result<Option<Result<Frame, WireError>>, WireError> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        let prefix = [self.buf[0], self.buf[1], self.buf[2], self.buf[3]];
        let len = body_len(prefix)?;
        if self.buf.len() < PREFIX_LEN + len {
            return Ok(None);
        }
        let frame = Frame::decode_body(&self.buf[PREFIX_LEN..PREFIX_LEN + len]);
        self.buf.drain(..PREFIX_LEN + len);
        Ok(Some(frame))
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
