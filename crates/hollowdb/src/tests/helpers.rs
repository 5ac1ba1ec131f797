use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Database, MarshalFn, Opts, Payload, UnmarshalFn, Value};

/// Options with the close-time maintenance passes disabled, so tests can
/// inspect the raw log exactly as commits left it.
pub fn plain_opts<P: AsRef<Path>>(dir: P, name: &str) -> Opts {
    let mut opts = Opts::new(dir.as_ref(), name);
    opts.archive_on_close = false;
    opts.compact_on_close = false;
    opts
}

pub fn open_plain<P: AsRef<Path>>(dir: P, name: &str) -> Database {
    Database::new(plain_opts(dir, name), Vec::new()).unwrap()
}

/// A raw byte value.
pub fn rv(s: &str) -> Value {
    Value::raw(s.as_bytes().to_vec())
}

/// The raw bytes of a value, as a string.
pub fn raw_str(v: &Value) -> String {
    String::from_utf8(v.as_raw().expect("raw value").to_vec()).unwrap()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
}

/// JSON codec for [`Person`] values.
pub fn person_codecs() -> (MarshalFn, UnmarshalFn) {
    let marshal: MarshalFn = Arc::new(|payload| {
        let person = payload
            .as_any()
            .downcast_ref::<Person>()
            .ok_or("expected a Person")?;
        Ok(serde_json::to_vec(person)?)
    });

    let unmarshal: UnmarshalFn = Arc::new(|bytes| {
        let person: Person = serde_json::from_slice(bytes)?;
        Ok(Arc::new(person) as Arc<dyn Payload>)
    });

    (marshal, unmarshal)
}

/// Reads a person out of a value, whether typed or still raw.
pub fn person_of(v: &Value) -> Person {
    match v.downcast_ref::<Person>() {
        Some(p) => p.clone(),
        None => serde_json::from_slice(v.as_raw().expect("raw person")).unwrap(),
    }
}

/// The live log's path for a database named `name` under `dir`.
pub fn live_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{name}.hdb"))
}

pub fn archive_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{name}.archive.hdb"))
}
