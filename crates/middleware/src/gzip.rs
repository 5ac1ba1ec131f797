//! Gzip compression layer backed by `flate2`.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::{closed_io, CloseRead, CloseWrite, Middleware, MiddlewareError};

/// DEFLATE compression with gzip framing.
pub struct GzipMiddleware;

impl Middleware for GzipMiddleware {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn writer<'a>(
        &self,
        inner: Box<dyn CloseWrite + 'a>,
    ) -> io::Result<Box<dyn CloseWrite + 'a>> {
        Ok(Box::new(GzipWriter {
            enc: Some(GzEncoder::new(inner, Compression::default())),
        }))
    }

    fn reader<'a>(&self, inner: Box<dyn CloseRead + 'a>) -> io::Result<Box<dyn CloseRead + 'a>> {
        Ok(Box::new(GzipReader {
            dec: Some(GzDecoder::new(inner)),
        }))
    }
}

struct GzipWriter<W: CloseWrite> {
    enc: Option<GzEncoder<W>>,
}

impl<W: CloseWrite> Write for GzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.enc {
            Some(enc) => enc.write(buf),
            None => Err(closed_io()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.enc {
            Some(enc) => enc.flush(),
            None => Err(closed_io()),
        }
    }
}

impl<W: CloseWrite> CloseWrite for GzipWriter<W> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        let enc = self.enc.take().ok_or(MiddlewareError::IsClosed)?;
        // finish() writes the gzip trailer into the inner layer.
        let mut inner = enc.finish()?;
        inner.close()
    }
}

impl<W: CloseWrite> Drop for GzipWriter<W> {
    fn drop(&mut self) {
        if self.enc.is_some() {
            let _ = self.close();
        }
    }
}

struct GzipReader<R: CloseRead> {
    dec: Option<GzDecoder<R>>,
}

impl<R: CloseRead> Read for GzipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.dec {
            Some(dec) => dec.read(buf),
            None => Err(closed_io()),
        }
    }
}

impl<R: CloseRead> CloseRead for GzipReader<R> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        let dec = self.dec.take().ok_or(MiddlewareError::IsClosed)?;
        let mut inner = dec.into_inner();
        inner.close()
    }
}

impl<R: CloseRead> Drop for GzipReader<R> {
    fn drop(&mut self) {
        if self.dec.is_some() {
            let _ = self.close();
        }
    }
}
