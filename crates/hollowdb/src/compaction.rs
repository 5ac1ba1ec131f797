//! Compaction: rewriting the live log from the committed tree.
//!
//! Superseded records disappear because the tree holds only live state.
//! The temp file is filled, sealed with the current checkpoint, and
//! atomically renamed over the live file — the rename is the only
//! destructive step, so a failure anywhere earlier leaves the live file
//! intact.

use buckets::AuthBucket;
use linefile::LineFile;
use logline::LogRecord;
use middleware::Middleware;
use tracing::debug;

use crate::error::Result;
use crate::Shared;

pub(crate) fn run(shared: &mut Shared) -> Result<()> {
    let Shared {
        root,
        live,
        temp,
        mws,
        pool,
        last_hash,
        ..
    } = shared;

    // Leftover scratch from an interrupted compact.
    match std::fs::remove_file(temp.path()) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
        _ => {}
    }

    temp.open()?;
    let mut scratch = pool.get();
    let written = (|| -> Result<()> {
        write_tree(root, temp, mws, &mut scratch)?;

        // The recorded checkpoint terminates the compacted log.
        scratch.clear();
        logline::encode(&LogRecord::Hash { id: *last_hash }, mws, &mut scratch)?;
        temp.write_line(&scratch)?;
        temp.flush()?;
        Ok(())
    })();
    pool.put(scratch);

    if let Err(err) = written {
        let _ = temp.close();
        return Err(err);
    }
    temp.close()?;

    live.close()?;
    std::fs::rename(temp.path(), live.path())?;
    live.open()?;
    live.seek_to_end()?;

    debug!("compacted live log");
    Ok(())
}

/// Emits one PUT per live value, depth-first in name order, so repeated
/// compactions of the same tree produce identical files.
fn write_tree(
    bucket: &AuthBucket,
    temp: &mut LineFile,
    mws: &[Box<dyn Middleware>],
    scratch: &mut Vec<u8>,
) -> Result<()> {
    for (key, value) in bucket.values() {
        let body = bucket.marshal_value(value)?;
        scratch.clear();
        let segments = bucket
            .path()
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .chain(std::iter::once(key.as_bytes().to_vec()))
            .collect();
        logline::encode(&LogRecord::Put { segments, body }, mws, scratch)?;
        temp.write_line(scratch)?;
    }

    for (_, child) in bucket.children() {
        write_tree(child, temp, mws, scratch)?;
    }
    Ok(())
}
