use std::fs;

use tempfile::tempdir;

use super::helpers::*;
use crate::{CryptMiddleware, Database, GzipMiddleware, Middleware, Txn};

fn gzip_stack() -> Vec<Box<dyn Middleware>> {
    vec![Box::new(GzipMiddleware)]
}

const KEY: [u8; 32] = [42u8; 32];
const IV: [u8; 16] = [7u8; 16];

// -------------------- Gzip stack end-to-end (S5) --------------------

#[test]
fn thousand_puts_survive_reopen_under_gzip() {
    let dir = tempdir().unwrap();
    let fixed = "a fixed value that compresses nicely, repeated in every record";

    {
        let db = Database::new(plain_opts(dir.path(), "test"), gzip_stack()).unwrap();
        db.update(|txn| {
            let b = txn.create_bucket("b", None, None)?;
            for i in 0..1000 {
                b.put(&format!("key{i:04}"), rv(fixed))?;
            }
            Ok(())
        })
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::new(plain_opts(dir.path(), "test"), gzip_stack()).unwrap();
    db.read(|txn| {
        let b = txn.bucket(&["b"]).expect("replayed under gzip");
        assert_eq!(b.keys().len(), 1000);
        for i in 0..1000 {
            assert_eq!(raw_str(&b.get(&format!("key{i:04}")).unwrap()), fixed);
        }
        Ok(())
    })
    .unwrap();
}

#[test]
fn encoded_payloads_contain_no_raw_newlines() {
    let dir = tempdir().unwrap();

    {
        let db = Database::new(plain_opts(dir.path(), "test"), gzip_stack()).unwrap();
        db.update(|txn| {
            let b = txn.create_bucket("b", None, None)?;
            // Values full of newlines must not fracture the line framing.
            for i in 0..50 {
                b.put(&format!("k{i}"), rv("line1\nline2\nline3\n"))?;
            }
            Ok(())
        })
        .unwrap();
        db.close().unwrap();
    }

    // Every newline byte in the file terminates a record: the line count
    // equals 50 puts + 1 checkpoint, and the file ends with a newline.
    let data = fs::read(live_path(dir.path(), "test")).unwrap();
    assert_eq!(data.last(), Some(&b'\n'));
    let newlines = data.iter().filter(|b| **b == b'\n').count();
    assert_eq!(newlines, 51);

    // And everything reads back intact.
    let db = Database::new(plain_opts(dir.path(), "test"), gzip_stack()).unwrap();
    db.read(|txn| {
        let b = txn.bucket(&["b"]).unwrap();
        assert_eq!(raw_str(&b.get("k0").unwrap()), "line1\nline2\nline3\n");
        Ok(())
    })
    .unwrap();
}

// -------------------- Encrypted stack --------------------

#[test]
fn encrypted_database_reopens_with_the_same_key() {
    let dir = tempdir().unwrap();
    let stack = || -> Vec<Box<dyn Middleware>> {
        vec![
            Box::new(GzipMiddleware),
            Box::new(CryptMiddleware::new(KEY, IV)),
        ]
    };

    {
        let db = Database::new(plain_opts(dir.path(), "test"), stack()).unwrap();
        db.update(|txn| {
            let b = txn.create_bucket("secrets", None, None)?;
            b.put("s1", rv("classified"))?;
            Ok(())
        })
        .unwrap();
        db.close().unwrap();
    }

    // The plaintext must not appear in the file.
    let data = fs::read(live_path(dir.path(), "test")).unwrap();
    let haystack = String::from_utf8_lossy(&data);
    assert!(!haystack.contains("classified"));

    let db = Database::new(plain_opts(dir.path(), "test"), stack()).unwrap();
    db.read(|txn| {
        let b = txn.bucket(&["secrets"]).expect("decrypted");
        assert_eq!(raw_str(&b.get("s1").unwrap()), "classified");
        Ok(())
    })
    .unwrap();
}

#[test]
fn wrong_key_yields_no_data_but_opens() {
    let dir = tempdir().unwrap();

    {
        let db = Database::new(
            plain_opts(dir.path(), "test"),
            vec![Box::new(CryptMiddleware::new(KEY, IV)) as Box<dyn Middleware>],
        )
        .unwrap();
        db.update(|txn| {
            let b = txn.create_bucket("b", None, None)?;
            b.put("k", rv("v"))?;
            Ok(())
        })
        .unwrap();
        db.close().unwrap();
    }

    // Replay under the wrong key skips every line it cannot decode.
    let wrong = CryptMiddleware::new([0u8; 32], IV);
    let db = Database::new(
        plain_opts(dir.path(), "test"),
        vec![Box::new(wrong) as Box<dyn Middleware>],
    )
    .unwrap();
    db.read(|txn| {
        assert!(txn.bucket(&["b"]).map_or(true, |b| !b.has("k")));
        Ok(())
    })
    .unwrap();
}
