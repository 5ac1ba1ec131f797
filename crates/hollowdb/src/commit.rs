//! The commit path: merging an overlay into the committed tree while
//! appending one log line per action.
//!
//! Ordering invariant: every log line is appended **before** the matching
//! in-memory mutation, so memory is never ahead of the log. A failure
//! aborts the remainder of the batch (no rollback); lines already appended
//! replay on the next open.

use buckets::{Action, AuthBucket, BucketError, OverlayBucket, Value};
use linefile::LineFile;
use logline::LogRecord;
use middleware::Middleware;

use crate::error::Result;
use crate::Shared;

pub(crate) fn apply(shared: &mut Shared, overlay: OverlayBucket) -> Result<()> {
    let Shared {
        root,
        live,
        mws,
        pool,
        ..
    } = shared;

    let mut scratch = pool.get();
    let result = commit_bucket(root, live, mws, overlay, &mut scratch);
    // One fsync per commit — also on failure, so lines already appended
    // reach stable storage and replay on the next open.
    let flushed = live.flush();
    pool.put(scratch);

    result?;
    flushed?;
    Ok(())
}

/// Post-order traversal: children first, then this node's own actions.
fn commit_bucket(
    root: &mut AuthBucket,
    live: &mut LineFile,
    mws: &[Box<dyn Middleware>],
    node: OverlayBucket,
    scratch: &mut Vec<u8>,
) -> Result<()> {
    let (path, marshal, unmarshal, children, actions) = node.into_parts();

    for (_, child) in children {
        commit_bucket(root, live, mws, child, scratch)?;
    }

    if actions.is_empty() && marshal.is_none() && unmarshal.is_none() {
        return Ok(());
    }

    // Materialize the bucket and persist any codecs registered during the
    // transaction; the effective marshaller may come from either tree.
    let effective_marshal = {
        let auth = root.ensure_bucket(&path)?;
        auth.set_codec(marshal, unmarshal);
        auth.marshal().cloned()
    };

    for (key, action) in actions {
        match action {
            Action::Put(value) => {
                {
                    let auth = root.ensure_bucket(&path)?;
                    if auth.has_child(&key) {
                        return Err(BucketError::CannotCreateBucket.into());
                    }
                }

                let body = match &value {
                    Value::Raw(bytes) => bytes.as_ref().clone(),
                    Value::Typed(payload) => {
                        let mfn = effective_marshal
                            .as_ref()
                            .ok_or(BucketError::CannotMarshal)?;
                        mfn(payload.as_ref()).map_err(BucketError::Codec)?
                    }
                };

                scratch.clear();
                logline::encode(
                    &LogRecord::Put {
                        segments: segments_of(&path, Some(&key)),
                        body,
                    },
                    mws,
                    scratch,
                )?;
                live.write_line(scratch)?;

                root.ensure_bucket(&path)?
                    .insert_value(key, value)
                    .expect("collision checked before the line was written");
            }
            Action::Del => {
                scratch.clear();
                logline::encode(
                    &LogRecord::Del {
                        segments: segments_of(&path, Some(&key)),
                    },
                    mws,
                    scratch,
                )?;
                live.write_line(scratch)?;

                let emptied = match root.bucket_mut(&path) {
                    Some(bucket) => {
                        bucket.remove_entry(&key);
                        bucket.is_empty() && !path.is_empty()
                    }
                    None => false,
                };

                // A delete that empties its bucket retires the bucket as
                // well, with its own log line.
                if emptied {
                    scratch.clear();
                    logline::encode(
                        &LogRecord::Del {
                            segments: segments_of(&path, None),
                        },
                        mws,
                        scratch,
                    )?;
                    live.write_line(scratch)?;

                    let (parent, name) = path.split_at(path.len() - 1);
                    if let Some(parent_bucket) = root.bucket_mut(parent) {
                        parent_bucket.remove_entry(&name[0]);
                    }
                }
            }
        }
    }

    Ok(())
}

fn segments_of(path: &[String], key: Option<&str>) -> Vec<Vec<u8>> {
    path.iter()
        .map(|s| s.as_bytes().to_vec())
        .chain(key.map(|k| k.as_bytes().to_vec()))
        .collect()
}
