//! The database-level error taxonomy.
//!
//! Leaf crates carry their own enums; this umbrella adds the kinds that
//! only exist at the coordinator level and folds the rest in via `From` so
//! `?` flows naturally through the commit, replay, archive, and compact
//! paths.

use std::io;

use buckets::{BoxError, BucketError};
use linefile::LineFileError;
use logline::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The database was already closed.
    #[error("database is closed")]
    IsClosed,

    /// A write operation was invoked on a read-only transaction.
    #[error("write operation on a read-only transaction")]
    InvalidTransactionType,

    /// Archive found nothing new since the last checkpoint. `close` treats
    /// this as success.
    #[error("no changes since the last archived checkpoint")]
    NoChanges,

    /// The archive's anchor checkpoint is missing from the live log.
    #[error("checkpoint not found in the live log")]
    HashNotFound,

    /// A line-file operation failed.
    #[error(transparent)]
    File(#[from] LineFileError),

    /// A record failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A bucket-tree operation failed.
    #[error(transparent)]
    Bucket(#[from] BucketError),

    /// An I/O error outside the line files (directory creation, rename).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An error returned by a transaction callback, surfaced verbatim.
    #[error("transaction error: {0}")]
    User(#[source] BoxError),
}

impl Error {
    /// Wraps an arbitrary caller error for return from a transaction
    /// callback.
    pub fn user<E: Into<BoxError>>(err: E) -> Self {
        Error::User(err.into())
    }
}
