//! AES-256-CTR stream cipher layer.
//!
//! Symmetric: the same keystream both encrypts and decrypts, so the writer
//! and reader halves are near-identical. A fresh cipher instance is created
//! per chain, restarting the keystream at the configured IV for every
//! record.

use std::io::{self, Read, Write};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;

use crate::{closed_io, CloseRead, CloseWrite, Middleware, MiddlewareError};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// IV length in bytes (one AES block).
pub const IV_LEN: usize = 16;

type Aes256Ctr = Ctr128BE<Aes256>;

/// AES-256-CTR encryption for record payloads.
pub struct CryptMiddleware {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl CryptMiddleware {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    fn cipher(&self) -> Aes256Ctr {
        Aes256Ctr::new((&self.key).into(), (&self.iv).into())
    }
}

impl Middleware for CryptMiddleware {
    fn name(&self) -> &'static str {
        "aes-ctr"
    }

    fn writer<'a>(
        &self,
        inner: Box<dyn CloseWrite + 'a>,
    ) -> io::Result<Box<dyn CloseWrite + 'a>> {
        Ok(Box::new(CryptWriter {
            cipher: self.cipher(),
            inner: Some(inner),
            scratch: Vec::new(),
        }))
    }

    fn reader<'a>(&self, inner: Box<dyn CloseRead + 'a>) -> io::Result<Box<dyn CloseRead + 'a>> {
        Ok(Box::new(CryptReader {
            cipher: self.cipher(),
            inner: Some(inner),
        }))
    }
}

struct CryptWriter<W: CloseWrite> {
    cipher: Aes256Ctr,
    inner: Option<W>,
    /// Keystream is applied to a copy so the caller's buffer stays intact.
    scratch: Vec<u8>,
}

impl<W: CloseWrite> Write for CryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(closed_io)?;
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply_keystream(&mut self.scratch);
        inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed_io)?.flush()
    }
}

impl<W: CloseWrite> CloseWrite for CryptWriter<W> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        let mut inner = self.inner.take().ok_or(MiddlewareError::IsClosed)?;
        inner.close()
    }
}

impl<W: CloseWrite> Drop for CryptWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.close();
        }
    }
}

struct CryptReader<R: CloseRead> {
    cipher: Aes256Ctr,
    inner: Option<R>,
}

impl<R: CloseRead> Read for CryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(closed_io)?;
        let n = inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

impl<R: CloseRead> CloseRead for CryptReader<R> {
    fn close(&mut self) -> Result<(), MiddlewareError> {
        let mut inner = self.inner.take().ok_or(MiddlewareError::IsClosed)?;
        inner.close()
    }
}

impl<R: CloseRead> Drop for CryptReader<R> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.close();
        }
    }
}
