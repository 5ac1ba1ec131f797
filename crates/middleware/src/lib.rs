//! # Middleware — Byte-Stream Transforms
//!
//! Composable writer/reader stacks that transform the payload of a log
//! record on its way to and from disk. A stack of N middlewares composes
//! into a single chain: writes flow outermost-to-innermost, reads flow
//! innermost-to-outermost.
//!
//! Stacks are rebuilt for every record — gzip and the stream cipher carry
//! per-stream state, so a chain must never be reused across records.
//!
//! ## Close Discipline
//!
//! Every layer must be closed exactly once. Closing a layer flushes its
//! trailing codec state (e.g. the gzip trailer, base64 padding) into the
//! layer beneath it and then closes that layer, so closing the head of a
//! chain closes the whole chain. A second close returns
//! [`MiddlewareError::IsClosed`]. Dropping an unclosed layer performs a
//! best-effort close so trailers are not silently lost.
//!
//! ## Concrete Layers
//!
//! | layer | crate | notes |
//! |-------|-------|-------|
//! | [`GzipMiddleware`] | `flate2` | DEFLATE with gzip framing |
//! | [`CryptMiddleware`] | `aes` + `ctr` | AES-256-CTR, 32-byte key + 16-byte IV |
//! | [`Base64Middleware`] | `base64` | standard alphabet; output is newline-free |
//!
//! Base64 must sit last in the encoding direction (file-adjacent) so the
//! bytes handed to the line file never contain a raw newline.

use std::io::{self, Read, Write};

use thiserror::Error;

mod b64;
mod crypt;
mod gzip;

pub use b64::Base64Middleware;
pub use crypt::{CryptMiddleware, IV_LEN, KEY_LEN};
pub use gzip::GzipMiddleware;

/// Errors surfaced by middleware chains.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// The layer was already closed.
    #[error("middleware layer is closed")]
    IsClosed,

    /// An underlying I/O error from the wrapped stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A writer layer that must be closed exactly once.
///
/// `close` flushes this layer's trailing state into its inner writer and
/// then closes the inner writer. A second call returns
/// [`MiddlewareError::IsClosed`].
pub trait CloseWrite: Write {
    fn close(&mut self) -> Result<(), MiddlewareError>;
}

/// A reader layer that must be closed exactly once.
pub trait CloseRead: Read {
    fn close(&mut self) -> Result<(), MiddlewareError>;
}

impl<T: CloseWrite + ?Sized> CloseWrite for Box<T> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        (**self).close()
    }
}

impl<T: CloseRead + ?Sized> CloseRead for Box<T> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        (**self).close()
    }
}

/// A pluggable byte-stream transform.
///
/// Each middleware supplies a writer constructor wrapping a sink and a
/// reader constructor wrapping a source. The returned objects are
/// themselves writers/readers and own the wrapped layer; closing them
/// closes the whole sub-chain.
pub trait Middleware: Send + Sync {
    /// Short identifier used in diagnostics.
    fn name(&self) -> &'static str;

    /// Wraps `inner` in this middleware's encoding layer.
    fn writer<'a>(
        &self,
        inner: Box<dyn CloseWrite + 'a>,
    ) -> io::Result<Box<dyn CloseWrite + 'a>>;

    /// Wraps `inner` in this middleware's decoding layer.
    fn reader<'a>(&self, inner: Box<dyn CloseRead + 'a>) -> io::Result<Box<dyn CloseRead + 'a>>;
}

/// Terminal write sink collecting encoded bytes into a `Vec<u8>`.
pub struct VecSink<'a> {
    out: Option<&'a mut Vec<u8>>,
}

impl<'a> VecSink<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out: Some(out) }
    }
}

impl Write for VecSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.out {
            Some(out) => {
                out.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(closed_io()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CloseWrite for VecSink<'_> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        self.out.take().ok_or(MiddlewareError::IsClosed)?;
        Ok(())
    }
}

/// Terminal read source over a byte slice.
pub struct SliceSource<'a> {
    data: Option<&'a [u8]>,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data: Some(data) }
    }
}

impl Read for SliceSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.data {
            Some(data) => data.read(buf),
            None => Err(closed_io()),
        }
    }
}

impl CloseRead for SliceSource<'_> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        self.data.take().ok_or(MiddlewareError::IsClosed)?;
        Ok(())
    }
}

/// Composes `mws` into a single write chain over `sink`.
///
/// The first middleware in the slice is the outermost layer (the one the
/// caller writes into); the last sits directly on `sink`. If a constructor
/// fails, the partially built chain is dropped, which tears the layers down
/// in reverse order of construction.
pub fn writer_stack<'a>(
    sink: Box<dyn CloseWrite + 'a>,
    mws: &'a [Box<dyn Middleware>],
) -> io::Result<Box<dyn CloseWrite + 'a>> {
    let mut w = sink;
    for mw in mws.iter().rev() {
        w = mw.writer(w)?;
    }
    Ok(w)
}

/// Composes `mws` into a single read chain over `source`.
///
/// Mirror of [`writer_stack`]: the first middleware in the slice is the
/// outermost layer, so bytes decoded from `source` pass innermost-first.
pub fn reader_stack<'a>(
    source: Box<dyn CloseRead + 'a>,
    mws: &'a [Box<dyn Middleware>],
) -> io::Result<Box<dyn CloseRead + 'a>> {
    let mut r = source;
    for mw in mws.iter().rev() {
        r = mw.reader(r)?;
    }
    Ok(r)
}

pub(crate) fn closed_io() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "middleware layer is closed")
}
