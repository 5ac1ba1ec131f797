//! # LogLine — Record Codec
//!
//! Encoding and decoding of one log record. A record is the unit of
//! durability for the store.
//!
//! ## Wire Format
//!
//! ```text
//! [action: u8, plain] [ middleware( [count: u8] ([len: u8][segment]){count} [body...] ) ]
//! ```
//!
//! The action byte stays **outside** the middleware envelope so a scanner
//! can classify a line without decoding it. Everything after it passes
//! through the middleware write stack. The newline terminator between
//! records belongs to the line file, not to this codec.
//!
//! Segments name a bucket path; the final segment is the leaf key (PUT and
//! DEL) or the 16-byte checkpoint identifier (HASH). The body is present
//! only for PUT and holds whatever the bucket's marshaller produced.
//!
//! | action | value | payload |
//! |--------|-------|---------|
//! | PUT    | 1     | path + body |
//! | DEL    | 2     | path |
//! | HASH   | 3     | 16-byte id |

use std::io::{self, Read};
use std::sync::Mutex;

use byteorder::WriteBytesExt;
use middleware::{
    reader_stack, writer_stack, CloseRead, CloseWrite, Middleware, MiddlewareError, SliceSource,
    VecSink,
};
use thiserror::Error;

/// Maximum byte length of a single key segment.
pub const MAX_KEY_LEN: usize = 255;

/// Maximum number of segments per record.
pub const MAX_SEGMENTS: usize = 255;

/// Byte width of a checkpoint identifier.
pub const HASH_ID_LEN: usize = 16;

/// The action tag of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    Put = 1,
    Del = 2,
    Hash = 3,
}

impl TryFrom<u8> for Action {
    type Error = CodecError;

    fn try_from(b: u8) -> Result<Self, CodecError> {
        match b {
            1 => Ok(Action::Put),
            2 => Ok(Action::Del),
            3 => Ok(Action::Hash),
            other => Err(CodecError::InvalidAction(other)),
        }
    }
}

/// A decoded log record.
///
/// `segments` holds the full path including the leaf key as its last
/// element. Segments are raw bytes at this layer; key-to-string conversion
/// belongs to the bucket tree above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Put {
        segments: Vec<Vec<u8>>,
        body: Vec<u8>,
    },
    Del {
        segments: Vec<Vec<u8>>,
    },
    Hash {
        id: [u8; HASH_ID_LEN],
    },
}

impl LogRecord {
    pub fn action(&self) -> Action {
        match self {
            LogRecord::Put { .. } => Action::Put,
            LogRecord::Del { .. } => Action::Del,
            LogRecord::Hash { .. } => Action::Hash,
        }
    }

    fn segments(&self) -> Vec<&[u8]> {
        match self {
            LogRecord::Put { segments, .. } | LogRecord::Del { segments } => {
                segments.iter().map(|s| s.as_slice()).collect()
            }
            LogRecord::Hash { id } => vec![id.as_slice()],
        }
    }
}

/// Errors from encoding or decoding a record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The action byte is outside the known set.
    #[error("invalid action byte: {0}")]
    InvalidAction(u8),

    /// A key segment is empty, too long, or the segment count is invalid.
    #[error("invalid key")]
    InvalidKey,

    /// The payload ended before the declared structure was complete.
    #[error("truncated log record")]
    Truncated,

    /// An I/O error from the middleware chain.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A middleware lifecycle error.
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
}

/// Encodes `rec` through the middleware stack, appending the result to
/// `out`. The output is newline-free whenever the stack ends in base64.
pub fn encode(
    rec: &LogRecord,
    mws: &[Box<dyn Middleware>],
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let segments = rec.segments();
    if segments.is_empty() || segments.len() > MAX_SEGMENTS {
        return Err(CodecError::InvalidKey);
    }
    for seg in &segments {
        if seg.is_empty() || seg.len() > MAX_KEY_LEN {
            return Err(CodecError::InvalidKey);
        }
    }

    out.push(rec.action() as u8);

    let sink: Box<dyn CloseWrite + '_> = Box::new(VecSink::new(out));
    let mut w = writer_stack(sink, mws)?;

    w.write_u8(segments.len() as u8)?;
    for seg in &segments {
        w.write_u8(seg.len() as u8)?;
        w.write_all(seg)?;
    }
    if let LogRecord::Put { body, .. } = rec {
        w.write_all(body)?;
    }
    w.close()?;

    Ok(())
}

/// Decodes one line (as produced by [`encode`], without its newline
/// terminator) back into a [`LogRecord`].
pub fn decode(line: &[u8], mws: &[Box<dyn Middleware>]) -> Result<LogRecord, CodecError> {
    let (&action_byte, rest) = line.split_first().ok_or(CodecError::Truncated)?;
    let action = Action::try_from(action_byte)?;

    let source: Box<dyn CloseRead + '_> = Box::new(SliceSource::new(rest));
    let mut r = reader_stack(source, mws)?;
    let mut payload = Vec::new();
    r.read_to_end(&mut payload)?;
    r.close()?;

    let mut p = payload.as_slice();
    let count = take(&mut p, 1)?[0] as usize;
    if count == 0 {
        return Err(CodecError::InvalidKey);
    }

    let mut segments = Vec::with_capacity(count);
    for _ in 0..count {
        let len = take(&mut p, 1)?[0] as usize;
        if len == 0 {
            return Err(CodecError::InvalidKey);
        }
        segments.push(take(&mut p, len)?.to_vec());
    }

    match action {
        Action::Put => Ok(LogRecord::Put {
            segments,
            body: p.to_vec(),
        }),
        Action::Del => Ok(LogRecord::Del { segments }),
        Action::Hash => {
            if segments.len() != 1 {
                return Err(CodecError::InvalidKey);
            }
            let id: [u8; HASH_ID_LEN] = segments[0]
                .as_slice()
                .try_into()
                .map_err(|_| CodecError::InvalidKey)?;
            Ok(LogRecord::Hash { id })
        }
    }
}

fn take<'a>(p: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if p.len() < n {
        return Err(CodecError::Truncated);
    }
    let (head, tail) = p.split_at(n);
    *p = tail;
    Ok(head)
}

/// A pool of reusable scratch buffers for encoded records.
///
/// Purely an allocation-recycling optimization: entries are cleared on
/// return and the pool may be bypassed entirely without affecting
/// correctness.
pub struct BufferPool {
    bufs: Mutex<Vec<Vec<u8>>>,
    init_capacity: usize,
}

impl BufferPool {
    pub fn new(init_capacity: usize) -> Self {
        Self {
            bufs: Mutex::new(Vec::new()),
            init_capacity,
        }
    }

    /// Takes a cleared buffer from the pool, allocating one when empty.
    pub fn get(&self) -> Vec<u8> {
        self.bufs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.init_capacity))
    }

    /// Returns a buffer to the pool. Ownership transfers here exactly once
    /// per [`get`](Self::get).
    pub fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.bufs.lock().unwrap_or_else(|e| e.into_inner()).push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(256)
    }
}
