//! # HollowDB — Embedded Transactional Bucket Store
//!
//! A single-process key/value store organized as a hierarchy of named
//! buckets. Durability comes from an append-only text log that doubles as
//! the authoritative on-disk representation: the in-memory tree is rebuilt
//! by replaying the log at open, mutated by committed update transactions,
//! and archived/compacted on close.
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                    DATABASE                      │
//! │                                                  │
//! │ read(fn)   → ReadTxn   → committed tree          │
//! │ update(fn) → UpdateTxn → overlay tree            │
//! │                 |                                │
//! │                 v  commit                        │
//! │        log codec → middleware → line file        │
//! │                 |                                │
//! │                 v                                │
//! │        committed tree (memory never ahead        │
//! │        of the log)                               │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Recovery reverses the write path: line file → middleware → log codec →
//! committed tree.
//!
//! ## Files
//!
//! Directory `<path>` holds up to three files:
//!
//! | file | role |
//! |------|------|
//! | `<name>.hdb` | live log, always present after open |
//! | `<name>.archive.hdb` | archive of historical segments between checkpoints |
//! | `<name>.tmp.hdb` | compaction scratch, exists only during compact |
//!
//! ## Concurrency
//!
//! One read/write lock per database guards the committed tree and the live
//! file. Readers share the lock; an update transaction holds it exclusively
//! for the user callback plus its commit, so writers are serialized and
//! readers never observe a partially committed overlay.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hollowdb::{Database, Opts, Txn, Value};
//!
//! let db = Database::new(Opts::new("/tmp/db", "example"), Vec::new())?;
//!
//! db.update(|txn| {
//!     let users = txn.create_bucket("users", None, None)?;
//!     users.put("u1", Value::raw(b"hello".to_vec()))?;
//!     Ok(())
//! })?;
//!
//! db.read(|txn| {
//!     let users = txn.bucket(&["users"]).expect("created above");
//!     assert!(users.has("u1"));
//!     Ok(())
//! })?;
//!
//! db.close()?;
//! # Ok::<(), hollowdb::Error>(())
//! ```

use std::fs;
use std::sync::RwLock;

use buckets::AuthBucket;
use linefile::LineFile;
use logline::{BufferPool, LogRecord, HASH_ID_LEN};
use tracing::debug;

mod archive;
mod commit;
mod compaction;
mod error;
mod opts;
mod read;
mod recovery;
mod txn;
mod update;

pub use buckets::{BoxError, MarshalFn, Payload, UnmarshalFn, Value};
pub use error::{Error, Result};
pub use middleware::{Base64Middleware, CryptMiddleware, GzipMiddleware, Middleware};
pub use opts::Opts;
pub use read::ReadTxn;
pub use txn::{Bucket, Txn};
pub use update::UpdateTxn;

/// Extension shared by the live, archive, and temp files.
pub const FILE_EXT: &str = "hdb";

/// Write-buffer capacity for the default backend.
const BUF_CAPACITY: usize = 8 * 1024;

/// Write-buffer capacity when `asyncBackend` is set.
const ASYNC_BUF_CAPACITY: usize = 256 * 1024;

pub(crate) struct Shared {
    root: AuthBucket,
    live: LineFile,
    archive: LineFile,
    temp: LineFile,
    mws: Vec<Box<dyn Middleware>>,
    pool: BufferPool,
    /// Id of the newest checkpoint in the live file.
    last_hash: [u8; HASH_ID_LEN],
    closed: bool,
}

/// An open database instance.
///
/// Cheap operations (`read`) take the lock shared; `update`, `archive`,
/// `compact`, and `close` take it exclusively.
pub struct Database {
    shared: RwLock<Shared>,
    opts: Opts,
}

impl Database {
    /// Opens (creating if necessary) the database described by `opts`.
    ///
    /// `middlewares` are applied outermost-first to every record payload; a
    /// base64 layer is always appended as the file-adjacent tail so
    /// encoded payloads never contain raw newlines.
    ///
    /// The live log is replayed into memory; lines that fail to decode are
    /// logged and skipped. A fresh checkpoint is appended when the log
    /// holds none, so an open database always has at least one.
    pub fn new(opts: Opts, middlewares: Vec<Box<dyn Middleware>>) -> Result<Self> {
        fs::create_dir_all(&opts.path)?;

        let mut mws = middlewares;
        mws.push(Box::new(Base64Middleware));

        let capacity = if opts.async_backend {
            ASYNC_BUF_CAPACITY
        } else {
            BUF_CAPACITY
        };

        let file = |suffix: &str| {
            LineFile::with_capacity(
                opts.path.join(format!("{}{}.{}", opts.name, suffix, FILE_EXT)),
                capacity,
            )
        };

        let mut live = file("");
        live.open()?;
        let mut archive = file(".archive");
        archive.open()?;
        let temp = file(".tmp");

        let mut root = AuthBucket::root();
        let replayed_hash = recovery::replay(&mut root, &mut live, &mws)?;

        let pool = BufferPool::default();
        let last_hash = match replayed_hash {
            Some(id) => id,
            None => {
                // The log carries no checkpoint yet (fresh or fully damaged
                // file): seal it so replay never observes a zero-checkpoint
                // state.
                let id = rand::random::<[u8; HASH_ID_LEN]>();
                let mut scratch = pool.get();
                let sealed = (|| -> Result<()> {
                    logline::encode(&LogRecord::Hash { id }, &mws, &mut scratch)?;
                    live.seek_to_end()?;
                    live.write_line(&scratch)?;
                    live.flush()?;
                    Ok(())
                })();
                pool.put(scratch);
                sealed?;
                id
            }
        };

        live.seek_to_end()?;
        debug!(name = %opts.name, path = %opts.path.display(), "database opened");

        Ok(Self {
            shared: RwLock::new(Shared {
                root,
                live,
                archive,
                temp,
                mws,
                pool,
                last_hash,
                closed: false,
            }),
            opts,
        })
    }

    /// Runs `f` inside a read-only transaction under the shared lock.
    ///
    /// The callback's error is surfaced verbatim.
    pub fn read<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ReadTxn<'_>) -> Result<()>,
    {
        let guard = self.shared.read().unwrap_or_else(|e| e.into_inner());
        if guard.closed {
            return Err(Error::IsClosed);
        }

        let txn = ReadTxn::new(&guard.root, self.opts.copy_on_read);
        f(&txn)
    }

    /// Runs `f` inside an update transaction under the exclusive lock and
    /// commits its overlay.
    ///
    /// When `f` returns an error the overlay is discarded, no log lines are
    /// written, and the error is surfaced verbatim. Commit is fail-fast:
    /// the first failing action aborts the remainder of the batch; lines
    /// already appended stay durable and replay on the next open.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&UpdateTxn<'_>) -> Result<()>,
    {
        let mut guard = self.shared.write().unwrap_or_else(|e| e.into_inner());
        let shared = &mut *guard;
        if shared.closed {
            return Err(Error::IsClosed);
        }

        let overlay = {
            let txn = UpdateTxn::new(
                &mut shared.root,
                self.opts.copy_on_read,
                self.opts.copy_on_write,
            );
            f(&txn)?;
            txn.into_overlay()
        };

        commit::apply(shared, overlay)
    }

    /// Appends everything committed since the last archived checkpoint to
    /// the archive file.
    ///
    /// Returns [`Error::NoChanges`] when the live tail holds nothing new.
    pub fn archive(&self) -> Result<()> {
        let mut guard = self.shared.write().unwrap_or_else(|e| e.into_inner());
        let shared = &mut *guard;
        if shared.closed {
            return Err(Error::IsClosed);
        }
        archive::run(shared)
    }

    /// Rewrites the live log from the committed in-memory state, dropping
    /// superseded records.
    pub fn compact(&self) -> Result<()> {
        let mut guard = self.shared.write().unwrap_or_else(|e| e.into_inner());
        let shared = &mut *guard;
        if shared.closed {
            return Err(Error::IsClosed);
        }
        compaction::run(shared)
    }

    /// Closes the database, optionally archiving and compacting first
    /// (see [`Opts::archive_on_close`] and [`Opts::compact_on_close`]).
    ///
    /// A second close fails with [`Error::IsClosed`]; archive's
    /// [`Error::NoChanges`] counts as success.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.shared.write().unwrap_or_else(|e| e.into_inner());
        let shared = &mut *guard;
        if shared.closed {
            return Err(Error::IsClosed);
        }

        if self.opts.archive_on_close {
            match archive::run(shared) {
                Ok(()) | Err(Error::NoChanges) => {}
                Err(err) => return Err(err),
            }
        }

        if self.opts.compact_on_close {
            compaction::run(shared)?;
        }

        shared.live.close()?;
        shared.archive.close()?;
        shared.closed = true;

        debug!(name = %self.opts.name, "database closed");
        Ok(())
    }

    /// The options this instance was opened with.
    pub fn opts(&self) -> &Opts {
        &self.opts
    }
}

/// Best-effort close on drop. Errors are ignored; callers wanting them
/// should close explicitly.
impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.opts.name)
            .field("path", &self.opts.path)
            .finish()
    }
}

#[cfg(test)]
mod tests;
