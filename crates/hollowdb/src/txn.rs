//! The transaction surface shared by read and update transactions.
//!
//! A [`Bucket`] is a thin handle — a path plus a reference back to its
//! transaction — so every operation routes through the transaction, which
//! is the only component that knows how to merge the overlay and committed
//! views.

use buckets::{MarshalFn, UnmarshalFn, Value};

use crate::error::Result;

/// Operations available inside a transaction callback.
///
/// Implemented by [`ReadTxn`](crate::ReadTxn) and
/// [`UpdateTxn`](crate::UpdateTxn). Write operations on a read transaction
/// fail with [`Error::InvalidTransactionType`](crate::Error).
pub trait Txn {
    /// Returns a handle to the bucket at `path`, or `None` when absent.
    fn bucket<'t>(&'t self, path: &[&str]) -> Option<Bucket<'t>>
    where
        Self: Sized,
    {
        self.bucket_at(&to_path(path))
    }

    /// Creates (or opens) a top-level bucket, registering its codecs.
    /// Update transactions only.
    fn create_bucket<'t>(
        &'t self,
        name: &str,
        marshal: Option<MarshalFn>,
        unmarshal: Option<UnmarshalFn>,
    ) -> Result<Bucket<'t>>
    where
        Self: Sized,
    {
        self.create_bucket_at(&[name.to_string()], marshal, unmarshal)
    }

    /// Deletes the bucket at `path` and every key beneath it. Update
    /// transactions only.
    fn delete_bucket(&self, path: &[&str]) -> Result<()>
    where
        Self: Sized,
    {
        self.delete_bucket_at(&to_path(path))
    }

    /// Names of the top-level buckets.
    fn buckets(&self) -> Vec<String>
    where
        Self: Sized,
    {
        self.buckets_at(&[])
    }

    // Path-keyed operations the bucket handles delegate to.

    #[doc(hidden)]
    fn bucket_at<'t>(&'t self, path: &[String]) -> Option<Bucket<'t>>;

    #[doc(hidden)]
    fn create_bucket_at<'t>(
        &'t self,
        path: &[String],
        marshal: Option<MarshalFn>,
        unmarshal: Option<UnmarshalFn>,
    ) -> Result<Bucket<'t>>;

    #[doc(hidden)]
    fn delete_bucket_at(&self, path: &[String]) -> Result<()>;

    #[doc(hidden)]
    fn buckets_at(&self, path: &[String]) -> Vec<String>;

    #[doc(hidden)]
    fn keys_at(&self, path: &[String]) -> Vec<String>;

    #[doc(hidden)]
    fn get_at(&self, path: &[String], key: &str) -> Option<Value>;

    #[doc(hidden)]
    fn has_at(&self, path: &[String], key: &str) -> bool;

    #[doc(hidden)]
    fn put_at(&self, path: &[String], key: &str, value: Value) -> Result<()>;

    #[doc(hidden)]
    fn delete_at(&self, path: &[String], key: &str) -> Result<()>;

    #[doc(hidden)]
    fn for_each_at(
        &self,
        path: &[String],
        visit: &mut dyn FnMut(&str, &Value) -> Result<()>,
    ) -> Result<()>;
}

pub(crate) fn to_path(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// A handle to one bucket within a transaction.
pub struct Bucket<'a> {
    path: Vec<String>,
    txn: &'a dyn Txn,
}

impl<'a> Bucket<'a> {
    pub(crate) fn new(path: Vec<String>, txn: &'a dyn Txn) -> Self {
        Self { path, txn }
    }

    /// Ordered segment names from the root to this bucket.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.txn.get_at(&self.path, key)
    }

    /// Returns whether `key` holds a value.
    pub fn has(&self, key: &str) -> bool {
        self.txn.has_at(&self.path, key)
    }

    /// Stores `value` under `key`. Update transactions only.
    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        self.txn.put_at(&self.path, key, value)
    }

    /// Deletes the value under `key`. Update transactions only.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.txn.delete_at(&self.path, key)
    }

    /// Visits every live key/value pair. The first error from `visit`
    /// aborts the iteration and is returned.
    pub fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &Value) -> Result<()>,
    {
        self.txn.for_each_at(&self.path, &mut visit)
    }

    /// Names of the live keys in this bucket.
    pub fn keys(&self) -> Vec<String> {
        self.txn.keys_at(&self.path)
    }

    /// Descends to a nested bucket.
    pub fn bucket(&self, path: &[&str]) -> Option<Bucket<'a>> {
        let mut full = self.path.clone();
        full.extend(path.iter().map(|s| s.to_string()));
        self.txn.bucket_at(&full)
    }

    /// Creates (or opens) a direct child bucket. Update transactions only.
    pub fn create_bucket(
        &self,
        name: &str,
        marshal: Option<MarshalFn>,
        unmarshal: Option<UnmarshalFn>,
    ) -> Result<Bucket<'a>> {
        let mut full = self.path.clone();
        full.push(name.to_string());
        self.txn.create_bucket_at(&full, marshal, unmarshal)
    }

    /// Deletes a direct child bucket. Update transactions only.
    pub fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut full = self.path.clone();
        full.push(name.to_string());
        self.txn.delete_bucket_at(&full)
    }

    /// Names of the direct child buckets.
    pub fn buckets(&self) -> Vec<String> {
        self.txn.buckets_at(&self.path)
    }
}
