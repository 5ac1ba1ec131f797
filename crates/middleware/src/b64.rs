//! Base64 framing layer.
//!
//! Sits last in the encoding direction so the byte sequence handed to the
//! line file is drawn from the standard base64 alphabet and therefore never
//! contains a raw newline, regardless of what the layers above it emit.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::engine::GeneralPurpose;
use base64::read::DecoderReader;
use base64::write::EncoderWriter;

use crate::{closed_io, CloseRead, CloseWrite, Middleware, MiddlewareError};

/// Standard-alphabet base64 framing.
pub struct Base64Middleware;

impl Middleware for Base64Middleware {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn writer<'a>(
        &self,
        inner: Box<dyn CloseWrite + 'a>,
    ) -> io::Result<Box<dyn CloseWrite + 'a>> {
        Ok(Box::new(B64Writer {
            enc: Some(EncoderWriter::new(inner, &STANDARD)),
        }))
    }

    fn reader<'a>(&self, inner: Box<dyn CloseRead + 'a>) -> io::Result<Box<dyn CloseRead + 'a>> {
        Ok(Box::new(B64Reader {
            dec: Some(DecoderReader::new(inner, &STANDARD)),
        }))
    }
}

struct B64Writer<W: CloseWrite> {
    enc: Option<EncoderWriter<'static, GeneralPurpose, W>>,
}

impl<W: CloseWrite> Write for B64Writer<W> {
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

impl<W: CloseWrite> CloseWrite for B64Writer<W> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        let mut enc = self.enc.take().ok_or(MiddlewareError::IsClosed)?;
        // finish() pads the trailing quantum and hands back the inner layer.
        let mut inner = enc.finish()?;
        inner.close()
    }
}

impl<W: CloseWrite> Drop for B64Writer<W> {
    fn drop(&mut self) {
        if self.enc.is_some() {
            let _ = self.close();
        }
    }
}

struct B64Reader<R: CloseRead> {
    dec: Option<DecoderReader<'static, GeneralPurpose, R>>,
}

impl<R: CloseRead> Read for B64Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.dec {
            Some(dec) => dec.read(buf),
            None => Err(closed_io()),
        }
    }
}

impl<R: CloseRead> CloseRead for B64Reader<R> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        let dec = self.dec.take().ok_or(MiddlewareError::IsClosed)?;
        let mut inner = dec.into_inner();
        inner.close()
    }
}

impl<R: CloseRead> Drop for B64Reader<R> {
    fn drop(&mut self) {
        if self.dec.is_some() {
            let _ = self.close();
        }
    }
}
