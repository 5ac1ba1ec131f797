//! The per-transaction overlay tree.

use std::collections::BTreeMap;

use crate::value::{MarshalFn, UnmarshalFn, Value};

/// A pending write intent for one key.
#[derive(Clone, Debug)]
pub enum Action {
    Put(Value),
    Del,
}

/// A node of an update transaction's overlay tree.
///
/// Mirrors the committed tree's path structure only where the transaction
/// has touched it. A node with no actions and no children is dead weight
/// and may be dropped at any time.
pub struct OverlayBucket {
    path: Vec<String>,
    marshal: Option<MarshalFn>,
    unmarshal: Option<UnmarshalFn>,
    children: BTreeMap<String, OverlayBucket>,
    actions: BTreeMap<String, Action>,
}

impl OverlayBucket {
    pub fn root() -> Self {
        Self::new(Vec::new())
    }

    fn new(path: Vec<String>) -> Self {
        Self {
            path,
            marshal: None,
            unmarshal: None,
            children: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn marshal(&self) -> Option<&MarshalFn> {
        self.marshal.as_ref()
    }

    pub fn unmarshal(&self) -> Option<&UnmarshalFn> {
        self.unmarshal.as_ref()
    }

    /// Registers codecs for the bucket this node shadows.
    pub fn set_codec(&mut self, marshal: Option<MarshalFn>, unmarshal: Option<UnmarshalFn>) {
        if marshal.is_some() {
            self.marshal = marshal;
        }
        if unmarshal.is_some() {
            self.unmarshal = unmarshal;
        }
    }

    /// Walks `path` relative to this node.
    pub fn bucket(&self, path: &[String]) -> Option<&OverlayBucket> {
        let mut cur = self;
        for name in path {
            cur = cur.children.get(name)?;
        }
        Some(cur)
    }

    pub fn bucket_mut(&mut self, path: &[String]) -> Option<&mut OverlayBucket> {
        let mut cur = self;
        for name in path {
            cur = cur.children.get_mut(name)?;
        }
        Some(cur)
    }

    /// Walks `path`, creating missing overlay nodes along the way.
    pub fn ensure_bucket(&mut self, path: &[String]) -> &mut OverlayBucket {
        let mut cur = self;
        for name in path {
            let child_path = {
                let mut p = cur.path.clone();
                p.push(name.clone());
                p
            };
            cur = cur
                .children
                .entry(name.clone())
                .or_insert_with(|| OverlayBucket::new(child_path));
        }
        cur
    }

    pub fn child(&self, name: &str) -> Option<&OverlayBucket> {
        self.children.get(name)
    }

    pub fn action(&self, key: &str) -> Option<&Action> {
        self.actions.get(key)
    }

    /// Records an intent for `key`, replacing any previous intent.
    pub fn set_action(&mut self, key: String, action: Action) {
        self.actions.insert(key, action);
    }

    pub fn remove_action(&mut self, key: &str) -> Option<Action> {
        self.actions.remove(key)
    }

    /// Clears a pending `Del` for `name`, leaving `Put` intents alone.
    /// Returns whether a `Del` was removed.
    pub fn clear_del(&mut self, name: &str) -> bool {
        if matches!(self.actions.get(name), Some(Action::Del)) {
            self.actions.remove(name);
            return true;
        }
        false
    }

    pub fn remove_child(&mut self, name: &str) -> Option<OverlayBucket> {
        self.children.remove(name)
    }

    /// Pending actions in key order — the order they will be appended to
    /// the log at commit.
    pub fn actions(&self) -> impl Iterator<Item = (&String, &Action)> {
        self.actions.iter()
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &OverlayBucket)> {
        self.children.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.children.is_empty()
    }

    /// Decomposes the node for commit-time consumption.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(
        self,
    ) -> (
        Vec<String>,
        Option<MarshalFn>,
        Option<UnmarshalFn>,
        BTreeMap<String, OverlayBucket>,
        BTreeMap<String, Action>,
    ) {
        (
            self.path,
            self.marshal,
            self.unmarshal,
            self.children,
            self.actions,
        )
    }
}

impl std::fmt::Debug for OverlayBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayBucket")
            .field("path", &self.path)
            .field("actions", &self.actions.len())
            .field("children", &self.children.len())
            .finish()
    }
}
