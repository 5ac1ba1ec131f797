use std::fs;

use tempfile::tempdir;

use super::helpers::*;
use crate::{Database, Error, Txn};

use linefile::{LineFile, LineVisit};
use logline::{LogRecord, HASH_ID_LEN};
use middleware::{Base64Middleware, Middleware};

fn decode_log(path: &std::path::Path) -> Vec<LogRecord> {
    let mws: Vec<Box<dyn Middleware>> = vec![Box::new(Base64Middleware)];
    let mut f = LineFile::new(path);
    f.open().unwrap();
    let mut records = Vec::new();
    f.read_lines(|line| {
        if !line.is_empty() {
            records.push(logline::decode(line, &mws).unwrap());
        }
        LineVisit::Continue
    })
    .unwrap();
    f.close().unwrap();
    records
}

fn last_hash(records: &[LogRecord]) -> Option<[u8; HASH_ID_LEN]> {
    records.iter().rev().find_map(|r| match r {
        LogRecord::Hash { id } => Some(*id),
        _ => None,
    })
}

// -------------------- Archive non-regression (property 6) --------------------

#[test]
fn archive_tail_matches_live_tail() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path(), "test");

    db.update(|txn| {
        let b = txn.create_bucket("b", None, None)?;
        for i in 0..10 {
            b.put(&format!("k{i}"), rv(&format!("v{i}")))?;
        }
        Ok(())
    })
    .unwrap();

    db.archive().unwrap();

    let live = decode_log(&live_path(dir.path(), "test"));
    let archived = decode_log(&archive_path(dir.path(), "test"));

    // The archive ends on the checkpoint that now seals the live tail.
    assert_eq!(last_hash(&archived), last_hash(&live));
    assert!(matches!(archived.last(), Some(LogRecord::Hash { .. })));

    // All ten puts made it over.
    let puts = archived
        .iter()
        .filter(|r| matches!(r, LogRecord::Put { .. }))
        .count();
    assert_eq!(puts, 10);
}

#[test]
fn archive_without_changes_reports_no_changes_and_leaves_live_intact() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path(), "test");

    db.update(|txn| {
        let b = txn.create_bucket("b", None, None)?;
        b.put("k", rv("v"))?;
        Ok(())
    })
    .unwrap();

    db.archive().unwrap();

    let before = fs::read(live_path(dir.path(), "test")).unwrap();
    let archive_before = fs::read(archive_path(dir.path(), "test")).unwrap();

    assert!(matches!(db.archive(), Err(Error::NoChanges)));

    assert_eq!(fs::read(live_path(dir.path(), "test")).unwrap(), before);
    assert_eq!(
        fs::read(archive_path(dir.path(), "test")).unwrap(),
        archive_before
    );
}

#[test]
fn archive_is_incremental_across_rounds() {
    let dir = tempdir().unwrap();
    let db = open_plain(dir.path(), "test");

    db.update(|txn| {
        let b = txn.create_bucket("b", None, None)?;
        b.put("first", rv("1"))?;
        Ok(())
    })
    .unwrap();
    db.archive().unwrap();

    db.update(|txn| {
        let b = txn.bucket(&["b"]).unwrap();
        b.put("second", rv("2"))?;
        Ok(())
    })
    .unwrap();
    db.archive().unwrap();

    let archived = decode_log(&archive_path(dir.path(), "test"));
    let puts: Vec<String> = archived
        .iter()
        .filter_map(|r| match r {
            LogRecord::Put { segments, .. } => {
                Some(String::from_utf8(segments.last().unwrap().clone()).unwrap())
            }
            _ => None,
        })
        .collect();

    // Each round copied only its own tail; nothing was archived twice.
    assert_eq!(puts, ["first", "second"]);
}

#[test]
fn archive_fails_when_its_anchor_left_the_live_log() {
    let dir = tempdir().unwrap();

    {
        let db = open_plain(dir.path(), "test");
        db.update(|txn| {
            let b = txn.create_bucket("b", None, None)?;
            b.put("k", rv("v"))?;
            Ok(())
        })
        .unwrap();
        db.archive().unwrap();
        db.close().unwrap();
    }

    // Replace the live log wholesale; the archive's anchor is gone.
    fs::remove_file(live_path(dir.path(), "test")).unwrap();
    let db = open_plain(dir.path(), "test");
    assert!(matches!(db.archive(), Err(Error::HashNotFound)));
}

// -------------------- Archive then compact (S6) --------------------

#[test]
fn archive_then_compact_preserves_all_keys() {
    let dir = tempdir().unwrap();

    {
        let db = open_plain(dir.path(), "test");
        db.update(|txn| {
            let b = txn.create_bucket("b", None, None)?;
            for i in 0..10 {
                b.put(&format!("first{i:02}"), rv("x"))?;
            }
            Ok(())
        })
        .unwrap();
        db.archive().unwrap();

        db.update(|txn| {
            let b = txn.bucket(&["b"]).unwrap();
            for i in 0..5 {
                b.put(&format!("later{i}"), rv("y"))?;
            }
            Ok(())
        })
        .unwrap();
        db.compact().unwrap();
        db.close().unwrap();
    }

    let db = open_plain(dir.path(), "test");
    db.read(|txn| {
        let b = txn.bucket(&["b"]).unwrap();
        assert_eq!(b.keys().len(), 15);
        Ok(())
    })
    .unwrap();

    // The archive holds the first ten puts, in order, ending on a HASH.
    let archived = decode_log(&archive_path(dir.path(), "test"));
    let puts: Vec<String> = archived
        .iter()
        .filter_map(|r| match r {
            LogRecord::Put { segments, .. } => {
                Some(String::from_utf8(segments.last().unwrap().clone()).unwrap())
            }
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("first{i:02}")).collect();
    assert_eq!(puts, expected);
    assert!(matches!(archived.last(), Some(LogRecord::Hash { .. })));
}

// -------------------- Close-time archive --------------------

#[test]
fn close_swallows_no_changes() {
    let dir = tempdir().unwrap();
    let mut opts = plain_opts(dir.path(), "test");
    opts.archive_on_close = true;
    let db = Database::new(opts, Vec::new()).unwrap();

    db.update(|txn| {
        let b = txn.create_bucket("b", None, None)?;
        b.put("k", rv("v"))?;
        Ok(())
    })
    .unwrap();

    db.archive().unwrap();
    // Nothing new since the manual archive; close must still succeed.
    db.close().unwrap();
}
