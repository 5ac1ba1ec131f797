//! # LineFile — Newline-Delimited Record File
//!
//! A file whose unit of I/O is one newline-terminated record. The log, its
//! archive, and the compaction scratch file are all line files.
//!
//! The file never interprets payloads: each payload written with
//! [`LineFile::write_line`] reappears as one buffer during
//! [`LineFile::read_lines`]. Callers must supply newline-free payloads
//! (middleware encoding guarantees this at the layer above).
//!
//! ## Lifecycle
//!
//! `closed ↔ open`. [`LineFile::open`] on an open file fails with
//! [`LineFileError::IsOpen`]; every other operation requires the open state
//! and fails with [`LineFileError::IsClosed`].
//!
//! ## Buffering
//!
//! Writes accumulate in a reusable user-space buffer and are written out
//! when the buffer crosses its capacity, on [`LineFile::flush`] (which also
//! syncs to stable storage), and before any seek or read so the on-disk
//! image is always consistent with what the reader observes.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Record terminator.
pub const NEWLINE: u8 = b'\n';

/// Default user-space write buffer capacity.
pub const DEFAULT_BUF_CAPACITY: usize = 8 * 1024;

/// Errors reported by [`LineFile`] operations.
#[derive(Debug, Error)]
pub enum LineFileError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The operation requires the open state.
    #[error("line file is closed")]
    IsClosed,

    /// `open` was called on an already open file.
    #[error("line file is already open")]
    IsOpen,

    /// A positional seek ran past the end of the file.
    #[error("line {0} not found")]
    LineNotFound(usize),
}

/// Visitor verdict for [`LineFile::read_lines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineVisit {
    Continue,
    Stop,
}

/// A file of newline-terminated records.
pub struct LineFile {
    path: PathBuf,
    file: Option<File>,
    /// Pending writes not yet handed to the OS; reused across lines.
    wbuf: Vec<u8>,
    buf_capacity: usize,
}

impl LineFile {
    /// Creates a closed line file handle for `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_capacity(path, DEFAULT_BUF_CAPACITY)
    }

    /// Creates a closed handle with a specific write-buffer capacity.
    ///
    /// A larger capacity batches more lines per `write` syscall; durability
    /// is unaffected because [`flush`](Self::flush) always syncs.
    pub fn with_capacity<P: Into<PathBuf>>(path: P, buf_capacity: usize) -> Self {
        Self {
            path: path.into(),
            file: None,
            wbuf: Vec::new(),
            buf_capacity: buf_capacity.max(1),
        }
    }

    /// Returns the on-disk path this handle operates on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true while the file is open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Opens (or creates) the file read-write, positioned at the start.
    pub fn open(&mut self) -> Result<(), LineFileError> {
        if self.file.is_some() {
            return Err(LineFileError::IsOpen);
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }

    /// Flushes pending writes, syncs, and releases the file handle.
    pub fn close(&mut self) -> Result<(), LineFileError> {
        if self.file.is_none() {
            return Err(LineFileError::IsClosed);
        }

        self.write_out()?;
        let file = self.file.take().expect("checked above");
        file.sync_all()?;
        Ok(())
    }

    /// Buffers `payload` followed by a single newline.
    ///
    /// The payload must already be newline-free (middleware-encoded).
    pub fn write_line(&mut self, payload: &[u8]) -> Result<(), LineFileError> {
        if self.file.is_none() {
            return Err(LineFileError::IsClosed);
        }
        debug_assert!(
            !payload.contains(&NEWLINE),
            "line payload must be newline-free"
        );

        self.wbuf.extend_from_slice(payload);
        self.wbuf.push(NEWLINE);

        if self.wbuf.len() >= self.buf_capacity {
            self.write_out()?;
        }
        Ok(())
    }

    /// Writes out the user-space buffer and syncs to stable storage.
    pub fn flush(&mut self) -> Result<(), LineFileError> {
        if self.file.is_none() {
            return Err(LineFileError::IsClosed);
        }
        self.write_out()?;
        self.file.as_mut().expect("checked above").sync_all()?;
        Ok(())
    }

    /// Positions at the start of the file.
    pub fn seek_to_start(&mut self) -> Result<(), LineFileError> {
        self.write_out()?;
        let file = self.file.as_mut().ok_or(LineFileError::IsClosed)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Positions at the end of the file.
    pub fn seek_to_end(&mut self) -> Result<(), LineFileError> {
        self.write_out()?;
        let file = self.file.as_mut().ok_or(LineFileError::IsClosed)?;
        file.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Positions at the start of line `n` (zero-based), scanning forward
    /// from the start and counting newline terminators.
    ///
    /// Fails with [`LineFileError::LineNotFound`] when the file holds fewer
    /// than `n` terminated lines.
    pub fn seek_to_line(&mut self, n: usize) -> Result<(), LineFileError> {
        self.write_out()?;
        let file = self.file.as_mut().ok_or(LineFileError::IsClosed)?;

        file.seek(SeekFrom::Start(0))?;
        if n == 0 {
            return Ok(());
        }

        let mut buf = [0u8; 8 * 1024];
        let mut seen = 0usize;
        let mut offset = 0u64;

        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                return Err(LineFileError::LineNotFound(n));
            }

            for (i, b) in buf[..read].iter().enumerate() {
                if *b == NEWLINE {
                    seen += 1;
                    if seen == n {
                        let target = offset + i as u64 + 1;
                        file.seek(SeekFrom::Start(target))?;
                        return Ok(());
                    }
                }
            }

            offset += read as u64;
        }
    }

    /// Invokes `visit` for each line from the current position until EOF or
    /// until the visitor returns [`LineVisit::Stop`]. The buffer passed to
    /// the visitor excludes the newline terminator.
    ///
    /// On `Stop`, the position is left at the start of the line following
    /// the one just visited; iteration is restartable by seeking.
    pub fn read_lines<F>(&mut self, mut visit: F) -> Result<(), LineFileError>
    where
        F: FnMut(&[u8]) -> LineVisit,
    {
        self.write_out()?;
        let file = self.file.as_mut().ok_or(LineFileError::IsClosed)?;

        let mut buf = [0u8; 8 * 1024];
        let mut line: Vec<u8> = Vec::new();
        // Absolute offset of the first byte of the current chunk.
        let mut chunk_start = file.stream_position()?;

        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                // Trailing line without terminator (e.g. a torn write).
                if !line.is_empty() {
                    visit(&line);
                }
                return Ok(());
            }

            let mut from = 0usize;
            for i in 0..read {
                if buf[i] != NEWLINE {
                    continue;
                }

                line.extend_from_slice(&buf[from..i]);
                let verdict = visit(&line);
                line.clear();
                from = i + 1;

                if verdict == LineVisit::Stop {
                    // Rewind past the readahead so the position lands on
                    // the next unvisited line.
                    file.seek(SeekFrom::Start(chunk_start + i as u64 + 1))?;
                    return Ok(());
                }
            }

            line.extend_from_slice(&buf[from..read]);
            chunk_start += read as u64;
        }
    }

    /// Copies the remaining contents of `other` (from its current position)
    /// to this file's current position. Both files must be open.
    pub fn append(&mut self, other: &mut LineFile) -> Result<(), LineFileError> {
        self.write_out()?;
        other.write_out()?;

        let dst = self.file.as_mut().ok_or(LineFileError::IsClosed)?;
        let src = other.file.as_mut().ok_or(LineFileError::IsClosed)?;
        io::copy(src, dst)?;
        Ok(())
    }

    /// Current size of the file in bytes, including pending buffered writes.
    pub fn len_bytes(&mut self) -> Result<u64, LineFileError> {
        self.write_out()?;
        let file = self.file.as_ref().ok_or(LineFileError::IsClosed)?;
        Ok(file.metadata()?.len())
    }

    /// Hands buffered bytes to the OS at the current position. Does not sync.
    fn write_out(&mut self) -> Result<(), LineFileError> {
        if self.wbuf.is_empty() {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(LineFileError::IsClosed)?;
        file.write_all(&self.wbuf)?;
        self.wbuf.clear();
        Ok(())
    }
}

/// Best-effort flush on drop so buffered lines are not lost when the owner
/// forgets to close. Errors are ignored; the caller should prefer an
/// explicit [`LineFile::close`].
impl Drop for LineFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for LineFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFile")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .field("pending_bytes", &self.wbuf.len())
            .finish()
    }
}
