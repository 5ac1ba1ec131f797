//! Incremental archival of the live log.
//!
//! Archive copies everything the live file committed since the newest
//! checkpoint the archive already holds. A fresh checkpoint is appended to
//! the live tail first, so the copied range always ends on a HASH line and
//! the archive's last checkpoint matches the live file's.

use linefile::{LineFile, LineVisit};
use logline::{LogRecord, HASH_ID_LEN};
use middleware::Middleware;
use tracing::debug;

use crate::error::{Error, Result};
use crate::Shared;

pub(crate) fn run(shared: &mut Shared) -> Result<()> {
    let Shared {
        live,
        archive,
        mws,
        pool,
        last_hash,
        ..
    } = shared;

    // The newest checkpoint already archived, if any.
    let anchor = last_hash_line(archive, mws)?;

    // Locate the anchor in the live file and count its lines.
    let mut total = 0usize;
    let mut anchor_line = None;
    live.seek_to_start()?;
    live.read_lines(|line| {
        if let Ok(LogRecord::Hash { id }) = logline::decode(line, mws) {
            if Some(id) == anchor {
                anchor_line = Some(total);
            }
        }
        total += 1;
        LineVisit::Continue
    })?;

    let start = match (anchor, anchor_line) {
        (Some(_), Some(line)) => line + 1,
        (Some(_), None) => return Err(Error::HashNotFound),
        (None, _) => 0,
    };
    if start >= total {
        return Err(Error::NoChanges);
    }

    // Seal the tail with a fresh checkpoint before copying.
    let id = rand::random::<[u8; HASH_ID_LEN]>();
    let mut scratch = pool.get();
    let sealed = (|| -> Result<()> {
        logline::encode(&LogRecord::Hash { id }, mws, &mut scratch)?;
        live.seek_to_end()?;
        live.write_line(&scratch)?;
        live.flush()?;
        Ok(())
    })();
    pool.put(scratch);
    sealed?;
    *last_hash = id;

    // Copy the post-anchor tail (fresh checkpoint included).
    live.seek_to_line(start)?;
    archive.seek_to_end()?;
    archive.append(live)?;
    archive.flush()?;
    live.seek_to_end()?;

    debug!(lines = total + 1 - start, "archived live tail");
    Ok(())
}

/// Scans a line file for its last checkpoint id.
fn last_hash_line(
    file: &mut LineFile,
    mws: &[Box<dyn Middleware>],
) -> Result<Option<[u8; HASH_ID_LEN]>> {
    file.seek_to_start()?;
    let mut last = None;
    file.read_lines(|line| {
        if let Ok(LogRecord::Hash { id }) = logline::decode(line, mws) {
            last = Some(id);
        }
        LineVisit::Continue
    })?;
    Ok(last)
}
