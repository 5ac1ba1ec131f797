//! Cold-start replay of the live log into the committed tree.

use buckets::{AuthBucket, Value};
use linefile::{LineFile, LineVisit};
use logline::{LogRecord, HASH_ID_LEN};
use middleware::Middleware;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Replays every line of the live file into `root`.
///
/// Undecodable or structurally invalid lines are logged and skipped so a
/// damaged log yields as much state as possible. Returns the id of the
/// last checkpoint seen, if any.
pub(crate) fn replay(
    root: &mut AuthBucket,
    live: &mut LineFile,
    mws: &[Box<dyn Middleware>],
) -> Result<Option<[u8; HASH_ID_LEN]>> {
    live.seek_to_start()?;

    let mut last_hash = None;
    let mut applied = 0u64;
    let mut skipped = 0u64;

    live.read_lines(|line| {
        if line.is_empty() {
            return LineVisit::Continue;
        }

        match logline::decode(line, mws) {
            Ok(LogRecord::Put { segments, body }) => match apply_put(root, segments, body) {
                Ok(()) => applied += 1,
                Err(err) => {
                    warn!(%err, "replay: skipping unappliable PUT");
                    skipped += 1;
                }
            },
            Ok(LogRecord::Del { segments }) => {
                apply_del(root, segments);
                applied += 1;
            }
            Ok(LogRecord::Hash { id }) => {
                last_hash = Some(id);
            }
            Err(err) => {
                warn!(%err, "replay: skipping undecodable line");
                skipped += 1;
            }
        }
        LineVisit::Continue
    })?;

    debug!(applied, skipped, "replay complete");
    Ok(last_hash)
}

/// Buckets materialize from PUT paths with no codec; values land raw and
/// are promoted when a codec is later registered.
fn apply_put(root: &mut AuthBucket, segments: Vec<Vec<u8>>, body: Vec<u8>) -> Result<()> {
    let mut names = decode_names(segments)?;
    let key = names.pop().expect("codec yields at least one segment");
    root.ensure_bucket(&names)?.insert_value(key, Value::raw(body))?;
    Ok(())
}

fn apply_del(root: &mut AuthBucket, segments: Vec<Vec<u8>>) {
    let Ok(mut names) = decode_names(segments) else {
        return;
    };
    let key = names.pop().expect("codec yields at least one segment");
    if let Some(bucket) = root.bucket_mut(&names) {
        bucket.remove_entry(&key);
    }
}

fn decode_names(segments: Vec<Vec<u8>>) -> Result<Vec<String>> {
    segments
        .into_iter()
        .map(|seg| {
            String::from_utf8(seg).map_err(|_| Error::from(buckets::BucketError::InvalidKey))
        })
        .collect()
}
