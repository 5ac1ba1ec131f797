//! Database options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options controlling one database instance.
///
/// Serializable so an external configuration loader can populate it from an
/// INI-style key/value source; field names match the option keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Opts {
    /// Directory containing the database files.
    pub path: PathBuf,

    /// Base name for the live, archive, and temp files.
    pub name: String,

    /// Deep-copy values returned from reads.
    pub copy_on_read: bool,

    /// Deep-copy values before insertion on writes.
    pub copy_on_write: bool,

    /// Run archive during `close`.
    pub archive_on_close: bool,

    /// Run compact during `close`.
    pub compact_on_close: bool,

    /// Hint the line files to batch writes in a larger user-space buffer.
    pub async_backend: bool,
}

impl Opts {
    /// Options for a database at `<path>/<name>` with the default behavior
    /// flags.
    pub fn new<P: Into<PathBuf>, S: Into<String>>(path: P, name: S) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            name: String::from("hollow"),
            copy_on_read: false,
            copy_on_write: false,
            archive_on_close: true,
            compact_on_close: true,
            async_backend: false,
        }
    }
}
