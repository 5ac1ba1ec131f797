//! Read-only transactions.

use buckets::{AuthBucket, MarshalFn, UnmarshalFn, Value};

use crate::error::{Error, Result};
use crate::txn::{Bucket, Txn};

/// A read-only transaction bound to the committed tree.
///
/// All operations are pure lookups; there is no overlay. Any number of
/// read transactions run concurrently under the shared lock.
pub struct ReadTxn<'a> {
    root: &'a AuthBucket,
    copy_on_read: bool,
}

impl<'a> ReadTxn<'a> {
    pub(crate) fn new(root: &'a AuthBucket, copy_on_read: bool) -> Self {
        Self { root, copy_on_read }
    }

    fn outgoing(&self, value: &Value) -> Value {
        if self.copy_on_read {
            value.dup()
        } else {
            value.clone()
        }
    }
}

impl Txn for ReadTxn<'_> {
    fn bucket_at<'t>(&'t self, path: &[String]) -> Option<Bucket<'t>> {
        self.root.bucket(path)?;
        Some(Bucket::new(path.to_vec(), self))
    }

    fn create_bucket_at<'t>(
        &'t self,
        _path: &[String],
        _marshal: Option<MarshalFn>,
        _unmarshal: Option<UnmarshalFn>,
    ) -> Result<Bucket<'t>> {
        Err(Error::InvalidTransactionType)
    }

    fn delete_bucket_at(&self, _path: &[String]) -> Result<()> {
        Err(Error::InvalidTransactionType)
    }

    fn buckets_at(&self, path: &[String]) -> Vec<String> {
        self.root
            .bucket(path)
            .map(|b| b.child_names())
            .unwrap_or_default()
    }

    fn keys_at(&self, path: &[String]) -> Vec<String> {
        self.root
            .bucket(path)
            .map(|b| b.keys())
            .unwrap_or_default()
    }

    fn get_at(&self, path: &[String], key: &str) -> Option<Value> {
        let value = self.root.bucket(path)?.value(key)?;
        Some(self.outgoing(value))
    }

    fn has_at(&self, path: &[String], key: &str) -> bool {
        self.root
            .bucket(path)
            .map_or(false, |b| b.has_value(key))
    }

    fn put_at(&self, _path: &[String], _key: &str, _value: Value) -> Result<()> {
        Err(Error::InvalidTransactionType)
    }

    fn delete_at(&self, _path: &[String], _key: &str) -> Result<()> {
        Err(Error::InvalidTransactionType)
    }

    fn for_each_at(
        &self,
        path: &[String],
        visit: &mut dyn FnMut(&str, &Value) -> Result<()>,
    ) -> Result<()> {
        let Some(bucket) = self.root.bucket(path) else {
            return Ok(());
        };

        for (key, value) in bucket.values() {
            if self.copy_on_read {
                let copy = value.dup();
                visit(key, &copy)?;
            } else {
                visit(key, value)?;
            }
        }
        Ok(())
    }
}
