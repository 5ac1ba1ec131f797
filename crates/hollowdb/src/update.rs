//! Update transactions.
//!
//! An update transaction owns an overlay tree mirroring the committed
//! tree's path structure only where modifications occur. Lookups consult
//! the overlay first and fall back to the committed tree; an overlay `Del`
//! masks the committed value. The overlay is handed to the commit path
//! when the user callback returns success.

use std::cell::RefCell;
use std::collections::BTreeSet;

use buckets::{
    validate_segment, Action, AuthBucket, MarshalFn, OverlayBucket, UnmarshalFn, Value,
    MAX_DEPTH,
};

use crate::error::Result;
use crate::txn::{Bucket, Txn};

/// A read/write transaction owning a private overlay.
///
/// Holds the database's exclusive lock for the duration of the user
/// callback plus the commit phase. The committed tree is only mutated
/// directly for raw-value promotion when a codec is registered; every data
/// mutation goes through the overlay and is applied at commit, after its
/// log line is durable.
pub struct UpdateTxn<'a> {
    root: RefCell<&'a mut AuthBucket>,
    overlay: RefCell<OverlayBucket>,
    copy_on_read: bool,
    copy_on_write: bool,
}

impl<'a> UpdateTxn<'a> {
    pub(crate) fn new(root: &'a mut AuthBucket, copy_on_read: bool, copy_on_write: bool) -> Self {
        Self {
            root: RefCell::new(root),
            overlay: RefCell::new(OverlayBucket::root()),
            copy_on_read,
            copy_on_write,
        }
    }

    pub(crate) fn into_overlay(self) -> OverlayBucket {
        self.overlay.into_inner()
    }

    /// True when some segment of `path` is masked by a pending bucket
    /// deletion that has not been superseded by a re-create.
    fn masked(&self, path: &[String]) -> bool {
        let overlay = self.overlay.borrow();
        let mut node = &*overlay;
        for name in path {
            if matches!(node.action(name), Some(Action::Del)) {
                return true;
            }
            match node.child(name) {
                Some(child) => node = child,
                None => return false,
            }
        }
        false
    }

    /// Clears pending bucket-deletion masks along `path`, so a put or
    /// create beneath a deleted bucket resurrects the path. Previously
    /// deleted keys stay masked by their own per-key `Del` intents.
    fn unmask_path(&self, path: &[String]) {
        let mut overlay = self.overlay.borrow_mut();
        let mut node = &mut *overlay;
        for name in path {
            node.clear_del(name);
            node = node.ensure_bucket(std::slice::from_ref(name));
        }
    }

    fn validate_path(path: &[String], extra: usize) -> Result<()> {
        if path.len() + extra > MAX_DEPTH {
            return Err(buckets::BucketError::InvalidKey.into());
        }
        for segment in path {
            validate_segment(segment)?;
        }
        Ok(())
    }

    fn recursive_delete(&self, path: &[String]) -> Result<()> {
        for key in self.keys_at(path) {
            self.overlay
                .borrow_mut()
                .ensure_bucket(path)
                .set_action(key, Action::Del);
        }

        for name in self.buckets_at(path) {
            let mut child = path.to_vec();
            child.push(name);
            self.recursive_delete(&child)?;
        }
        Ok(())
    }
}

impl Txn for UpdateTxn<'_> {
    fn bucket_at<'t>(&'t self, path: &[String]) -> Option<Bucket<'t>> {
        if self.masked(path) {
            return None;
        }
        if self.overlay.borrow().bucket(path).is_some() {
            return Some(Bucket::new(path.to_vec(), self));
        }

        // The bucket exists only in the committed tree: shadow it into the
        // overlay, carrying its codecs, so writes through the handle can be
        // marshalled at commit.
        let (marshal, unmarshal) = {
            let root = self.root.borrow();
            let committed = root.bucket(path)?;
            (committed.marshal().cloned(), committed.unmarshal().cloned())
        };
        self.overlay
            .borrow_mut()
            .ensure_bucket(path)
            .set_codec(marshal, unmarshal);
        Some(Bucket::new(path.to_vec(), self))
    }

    fn create_bucket_at<'t>(
        &'t self,
        path: &[String],
        marshal: Option<MarshalFn>,
        unmarshal: Option<UnmarshalFn>,
    ) -> Result<Bucket<'t>> {
        if path.is_empty() {
            return Err(buckets::BucketError::InvalidKey.into());
        }
        Self::validate_path(path, 0)?;

        // A bucket cannot shadow a committed value anywhere along the path.
        {
            let root = self.root.borrow();
            let mut cur = Some(&**root);
            for name in path {
                let Some(bucket) = cur else { break };
                if bucket.has_value(name) {
                    return Err(buckets::BucketError::CannotCreateBucket.into());
                }
                cur = bucket.bucket(std::slice::from_ref(name));
            }
        }

        // Nor a pending value intent in the overlay.
        let (parent, name) = path.split_at(path.len() - 1);
        let name = &name[0];
        {
            let overlay = self.overlay.borrow();
            if let Some(node) = overlay.bucket(parent) {
                if matches!(node.action(name), Some(Action::Put(_))) {
                    return Err(buckets::BucketError::CannotCreateBucket.into());
                }
            }
        }

        // A delete-then-create in the same transaction resurrects the path.
        self.unmask_path(path);

        self.overlay
            .borrow_mut()
            .ensure_bucket(path)
            .set_codec(marshal.clone(), unmarshal.clone());

        // When the committed bucket already exists, persist the codecs now
        // and promote its raw values through the new unmarshal.
        {
            let mut root = self.root.borrow_mut();
            if let Some(committed) = root.bucket_mut(path) {
                committed.set_codec(marshal, unmarshal);
            }
        }

        Ok(Bucket::new(path.to_vec(), self))
    }

    fn delete_bucket_at(&self, path: &[String]) -> Result<()> {
        if path.is_empty() {
            return Err(buckets::BucketError::InvalidKey.into());
        }
        Self::validate_path(path, 0)?;

        let exists = self.overlay.borrow().bucket(path).is_some()
            || self.root.borrow().bucket(path).is_some();
        if !exists || self.masked(path) {
            return Ok(());
        }

        self.recursive_delete(path)?;

        let (parent, name) = path.split_at(path.len() - 1);
        self.overlay
            .borrow_mut()
            .ensure_bucket(parent)
            .set_action(name[0].clone(), Action::Del);
        Ok(())
    }

    fn buckets_at(&self, path: &[String]) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();

        if !self.masked(path) {
            let root = self.root.borrow();
            if let Some(bucket) = root.bucket(path) {
                names.extend(bucket.child_names());
            }
        }

        let overlay = self.overlay.borrow();
        if let Some(node) = overlay.bucket(path) {
            for (name, _) in node.children() {
                names.insert(name.clone());
            }
            for (name, action) in node.actions() {
                if matches!(action, Action::Del) {
                    names.remove(name);
                }
            }
        }

        names.into_iter().collect()
    }

    fn keys_at(&self, path: &[String]) -> Vec<String> {
        let mut keys: BTreeSet<String> = BTreeSet::new();

        if !self.masked(path) {
            let root = self.root.borrow();
            if let Some(bucket) = root.bucket(path) {
                keys.extend(bucket.keys());
            }
        }

        let overlay = self.overlay.borrow();
        if let Some(node) = overlay.bucket(path) {
            for (key, action) in node.actions() {
                match action {
                    Action::Put(_) => {
                        keys.insert(key.clone());
                    }
                    Action::Del => {
                        keys.remove(key);
                    }
                }
            }
        }

        keys.into_iter().collect()
    }

    fn get_at(&self, path: &[String], key: &str) -> Option<Value> {
        {
            let overlay = self.overlay.borrow();
            if let Some(node) = overlay.bucket(path) {
                match node.action(key) {
                    Some(Action::Put(value)) => {
                        return Some(if self.copy_on_write {
                            value.dup()
                        } else {
                            value.clone()
                        });
                    }
                    Some(Action::Del) => return None,
                    None => {}
                }
            }
        }

        if self.masked(path) {
            return None;
        }

        let root = self.root.borrow();
        let value = root.bucket(path)?.value(key)?;
        Some(if self.copy_on_read {
            value.dup()
        } else {
            value.clone()
        })
    }

    fn has_at(&self, path: &[String], key: &str) -> bool {
        {
            let overlay = self.overlay.borrow();
            if let Some(node) = overlay.bucket(path) {
                match node.action(key) {
                    Some(Action::Put(_)) => return true,
                    Some(Action::Del) => return false,
                    None => {}
                }
            }
        }

        if self.masked(path) {
            return false;
        }

        self.root
            .borrow()
            .bucket(path)
            .map_or(false, |b| b.has_value(key))
    }

    fn put_at(&self, path: &[String], key: &str, value: Value) -> Result<()> {
        validate_segment(key)?;
        Self::validate_path(path, 1)?;

        let value = if self.copy_on_write {
            value.dup()
        } else {
            value
        };

        self.unmask_path(path);
        self.overlay
            .borrow_mut()
            .ensure_bucket(path)
            .set_action(key.to_string(), Action::Put(value));
        Ok(())
    }

    fn delete_at(&self, path: &[String], key: &str) -> Result<()> {
        validate_segment(key)?;
        Self::validate_path(path, 1)?;

        // Deleting inside a bucket that exists nowhere is a no-op.
        let exists = self.overlay.borrow().bucket(path).is_some()
            || self.root.borrow().bucket(path).is_some();
        if !exists {
            return Ok(());
        }

        self.overlay
            .borrow_mut()
            .ensure_bucket(path)
            .set_action(key.to_string(), Action::Del);
        Ok(())
    }

    fn for_each_at(
        &self,
        path: &[String],
        visit: &mut dyn FnMut(&str, &Value) -> Result<()>,
    ) -> Result<()> {
        // Collect the union view first: the callback may re-enter this
        // transaction, so no RefCell borrow can be held while it runs.
        let mut items: Vec<(String, Value)> = Vec::new();
        let mut ignore: BTreeSet<String> = BTreeSet::new();

        {
            let overlay = self.overlay.borrow();
            if let Some(node) = overlay.bucket(path) {
                for (key, action) in node.actions() {
                    ignore.insert(key.clone());
                    if let Action::Put(value) = action {
                        let out = if self.copy_on_read {
                            value.dup()
                        } else {
                            value.clone()
                        };
                        items.push((key.clone(), out));
                    }
                }
            }
        }

        if !self.masked(path) {
            let root = self.root.borrow();
            if let Some(bucket) = root.bucket(path) {
                for (key, value) in bucket.values() {
                    if ignore.contains(key) {
                        continue;
                    }
                    let out = if self.copy_on_read {
                        value.dup()
                    } else {
                        value.clone()
                    };
                    items.push((key.clone(), out));
                }
            }
        }

        for (key, value) in &items {
            visit(key, value)?;
        }
        Ok(())
    }
}
