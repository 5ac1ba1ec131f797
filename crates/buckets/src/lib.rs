//! # Buckets — In-Memory Hierarchical Data Model
//!
//! Two tree shapes share this crate:
//!
//! - [`AuthBucket`] — the authoritative tree holding committed state. A
//!   name inside a bucket maps to either a child bucket or a value, never
//!   both.
//! - [`OverlayBucket`] — the per-transaction overlay mirroring the path
//!   structure of the authoritative tree only where modifications occur.
//!   Its leaves are pending [`Action`]s, merged into the authoritative tree
//!   at commit.
//!
//! The overlay references the authoritative tree by **path** only; there
//! are no owning pointers between the trees.
//!
//! Both trees use `BTreeMap`, so enumeration order is deterministic: the
//! order actions are applied to memory equals the order their log lines are
//! appended, and compaction output is reproducible.

use std::collections::BTreeMap;

use thiserror::Error;

mod overlay;
mod value;

pub use overlay::{Action, OverlayBucket};
pub use value::{BoxError, MarshalFn, Payload, UnmarshalFn, Value};

/// Maximum byte length of a bucket or key segment.
pub const MAX_SEGMENT_LEN: usize = 255;

/// Maximum path depth (segments per full path, leaf key included).
pub const MAX_DEPTH: usize = 255;

/// Errors from bucket-tree operations.
#[derive(Debug, Error)]
pub enum BucketError {
    /// Segment empty, longer than [`MAX_SEGMENT_LEN`], or path deeper than
    /// [`MAX_DEPTH`].
    #[error("invalid key")]
    InvalidKey,

    /// The path collides with an existing entry of the other kind.
    #[error("cannot create bucket: name already in use")]
    CannotCreateBucket,

    /// A typed value was stored in a bucket with no registered marshaller.
    #[error("bucket has no marshaller")]
    CannotMarshal,

    /// A user-supplied codec failed.
    #[error("value codec error: {0}")]
    Codec(#[source] BoxError),
}

/// Validates one path or key segment.
pub fn validate_segment(name: &str) -> Result<(), BucketError> {
    if name.is_empty() || name.len() > MAX_SEGMENT_LEN {
        return Err(BucketError::InvalidKey);
    }
    Ok(())
}

/// A node of the authoritative (committed) tree.
pub struct AuthBucket {
    path: Vec<String>,
    marshal: Option<MarshalFn>,
    unmarshal: Option<UnmarshalFn>,
    children: BTreeMap<String, AuthBucket>,
    values: BTreeMap<String, Value>,
}

impl AuthBucket {
    /// The root of a fresh, empty tree.
    pub fn root() -> Self {
        Self::new(Vec::new())
    }

    fn new(path: Vec<String>) -> Self {
        Self {
            path,
            marshal: None,
            unmarshal: None,
            children: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    /// Ordered segment names from the root to this bucket.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn marshal(&self) -> Option<&MarshalFn> {
        self.marshal.as_ref()
    }

    pub fn unmarshal(&self) -> Option<&UnmarshalFn> {
        self.unmarshal.as_ref()
    }

    /// Walks `path` (relative to this bucket). Returns `None` when any step
    /// is missing or is a value rather than a bucket.
    pub fn bucket(&self, path: &[String]) -> Option<&AuthBucket> {
        let mut cur = self;
        for name in path {
            cur = cur.children.get(name)?;
        }
        Some(cur)
    }

    pub fn bucket_mut(&mut self, path: &[String]) -> Option<&mut AuthBucket> {
        let mut cur = self;
        for name in path {
            cur = cur.children.get_mut(name)?;
        }
        Some(cur)
    }

    /// Walks `path`, creating missing buckets along the way.
    ///
    /// Fails with [`BucketError::CannotCreateBucket`] when a step collides
    /// with an existing value, and [`BucketError::InvalidKey`] on a segment
    /// or depth violation.
    pub fn ensure_bucket(&mut self, path: &[String]) -> Result<&mut AuthBucket, BucketError> {
        if self.path.len() + path.len() > MAX_DEPTH {
            return Err(BucketError::InvalidKey);
        }

        let mut cur = self;
        for name in path {
            validate_segment(name)?;
            if cur.values.contains_key(name) {
                return Err(BucketError::CannotCreateBucket);
            }
            let child_path = {
                let mut p = cur.path.clone();
                p.push(name.clone());
                p
            };
            cur = cur
                .children
                .entry(name.clone())
                .or_insert_with(|| AuthBucket::new(child_path));
        }
        Ok(cur)
    }

    /// Registers codecs on this bucket. Raw values are promoted through a
    /// newly supplied unmarshal; values that fail to decode stay raw.
    pub fn set_codec(&mut self, marshal: Option<MarshalFn>, unmarshal: Option<UnmarshalFn>) {
        if marshal.is_some() {
            self.marshal = marshal;
        }
        if unmarshal.is_some() {
            self.unmarshal = unmarshal;
            self.promote_raw();
        }
    }

    /// Runs every raw value through the registered unmarshal, in place.
    pub fn promote_raw(&mut self) {
        let Some(ufn) = self.unmarshal.clone() else {
            return;
        };

        for v in self.values.values_mut() {
            if let Value::Raw(bytes) = v {
                if let Ok(payload) = ufn(bytes.as_slice()) {
                    *v = Value::Typed(payload);
                }
            }
        }
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Stores a value under `key`, replacing any previous value.
    ///
    /// Fails with [`BucketError::CannotCreateBucket`] when the name already
    /// maps to a child bucket.
    pub fn insert_value(&mut self, key: String, value: Value) -> Result<(), BucketError> {
        if self.children.contains_key(&key) {
            return Err(BucketError::CannotCreateBucket);
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Removes the entry named `key` (value or whole child subtree).
    /// Returns whether anything was removed.
    pub fn remove_entry(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some() || self.children.remove(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }

    /// Value entries in key order.
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Child buckets in name order.
    pub fn children(&self) -> impl Iterator<Item = (&String, &AuthBucket)> {
        self.children.iter()
    }

    /// Names of the value entries.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Names of the direct child buckets. Children of children are not
    /// included.
    pub fn child_names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Serializes `value` into a log-record body: raw bytes pass through
    /// verbatim, typed payloads go through this bucket's marshaller.
    pub fn marshal_value(&self, value: &Value) -> Result<Vec<u8>, BucketError> {
        match value {
            Value::Raw(bytes) => Ok(bytes.as_ref().clone()),
            Value::Typed(payload) => {
                let mfn = self.marshal.as_ref().ok_or(BucketError::CannotMarshal)?;
                mfn(payload.as_ref()).map_err(BucketError::Codec)
            }
        }
    }
}

impl std::fmt::Debug for AuthBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBucket")
            .field("path", &self.path)
            .field("values", &self.values.len())
            .field("children", &self.children.len())
            .field("has_codec", &self.marshal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
