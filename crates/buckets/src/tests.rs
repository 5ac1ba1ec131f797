use super::*;
use std::sync::Arc;

// -------------------- Helpers --------------------

fn p(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Codec for a toy `name=<x>` record, enough to exercise promotion.
#[derive(Clone, Debug, PartialEq)]
struct Person {
    name: String,
}

fn person_marshal() -> MarshalFn {
    Arc::new(|payload| {
        let person = payload
            .as_any()
            .downcast_ref::<Person>()
            .ok_or("not a Person")?;
        Ok(format!("name={}", person.name).into_bytes())
    })
}

fn person_unmarshal() -> UnmarshalFn {
    Arc::new(|bytes| {
        let text = std::str::from_utf8(bytes)?;
        let name = text.strip_prefix("name=").ok_or("bad record")?;
        Ok(Arc::new(Person {
            name: name.to_string(),
        }) as Arc<dyn Payload>)
    })
}

// -------------------- Authoritative tree --------------------

#[test]
fn ensure_bucket_creates_nested_paths() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["a", "b", "c"])).unwrap();
    assert_eq!(b.path(), &p(&["a", "b", "c"])[..]);

    assert!(root.bucket(&p(&["a"])).is_some());
    assert!(root.bucket(&p(&["a", "b"])).is_some());
    assert!(root.bucket(&p(&["a", "x"])).is_none());
}

#[test]
fn value_and_bucket_names_never_collide() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["users"])).unwrap();
    b.insert_value("alice".into(), Value::raw(b"v".to_vec()))
        .unwrap();

    // A bucket cannot shadow the value...
    assert!(matches!(
        root.ensure_bucket(&p(&["users", "alice"])),
        Err(BucketError::CannotCreateBucket)
    ));

    // ...and a value cannot shadow a bucket.
    let b = root.ensure_bucket(&p(&["users"])).unwrap();
    b.ensure_bucket(&p(&["team"])).unwrap();
    assert!(matches!(
        root.bucket_mut(&p(&["users"]))
            .unwrap()
            .insert_value("team".into(), Value::raw(b"v".to_vec())),
        Err(BucketError::CannotCreateBucket)
    ));
}

#[test]
fn segment_validation() {
    let mut root = AuthBucket::root();
    assert!(matches!(
        root.ensure_bucket(&p(&[""])),
        Err(BucketError::InvalidKey)
    ));

    let long = "x".repeat(MAX_SEGMENT_LEN + 1);
    assert!(matches!(
        root.ensure_bucket(&[long]),
        Err(BucketError::InvalidKey)
    ));

    let max = "x".repeat(MAX_SEGMENT_LEN);
    assert!(root.ensure_bucket(&[max]).is_ok());
}

#[test]
fn remove_entry_removes_values_and_subtrees() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["a"])).unwrap();
    b.insert_value("k".into(), Value::raw(b"v".to_vec())).unwrap();
    root.ensure_bucket(&p(&["a", "sub"])).unwrap();

    let a = root.bucket_mut(&p(&["a"])).unwrap();
    assert!(a.remove_entry("k"));
    assert!(a.remove_entry("sub"));
    assert!(!a.remove_entry("missing"));
    assert!(a.is_empty());
}

// -------------------- Raw promotion --------------------

#[test]
fn raw_values_promote_when_codec_registered() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["people"])).unwrap();
    b.insert_value("a".into(), Value::raw(b"name=Ada".to_vec()))
        .unwrap();
    b.insert_value("bad".into(), Value::raw(b"garbage".to_vec()))
        .unwrap();

    b.set_codec(Some(person_marshal()), Some(person_unmarshal()));

    let a = b.value("a").unwrap();
    assert_eq!(
        a.downcast_ref::<Person>(),
        Some(&Person { name: "Ada".into() })
    );

    // Values the codec cannot parse stay raw.
    assert!(b.value("bad").unwrap().is_raw());
}

#[test]
fn marshal_value_raw_passes_through() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["b"])).unwrap();
    let body = b
        .marshal_value(&Value::raw(b"verbatim".to_vec()))
        .unwrap();
    assert_eq!(body, b"verbatim");
}

#[test]
fn marshal_typed_without_codec_fails() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["b"])).unwrap();
    let v = Value::typed(Person { name: "Ada".into() });
    assert!(matches!(
        b.marshal_value(&v),
        Err(BucketError::CannotMarshal)
    ));
}

#[test]
fn marshal_typed_through_codec() {
    let mut root = AuthBucket::root();
    let b = root.ensure_bucket(&p(&["b"])).unwrap();
    b.set_codec(Some(person_marshal()), Some(person_unmarshal()));

    let v = Value::typed(Person { name: "Ada".into() });
    assert_eq!(b.marshal_value(&v).unwrap(), b"name=Ada");
}

// -------------------- Value duplication --------------------

#[test]
fn dup_is_a_deep_copy() {
    let v = Value::typed(Person { name: "Ada".into() });
    let d = v.dup();
    assert_eq!(
        d.downcast_ref::<Person>(),
        Some(&Person { name: "Ada".into() })
    );

    let r = Value::raw(b"bytes".to_vec());
    let rd = r.dup();
    assert_eq!(rd.as_raw(), Some(&b"bytes"[..]));
}

// -------------------- Overlay tree --------------------

#[test]
fn overlay_actions_enumerate_in_key_order() {
    let mut o = OverlayBucket::root();
    let b = o.ensure_bucket(&p(&["b"]));
    b.set_action("zebra".into(), Action::Del);
    b.set_action("apple".into(), Action::Put(Value::raw(b"1".to_vec())));
    b.set_action("mango".into(), Action::Put(Value::raw(b"2".to_vec())));

    let keys: Vec<&String> = o
        .bucket(&p(&["b"]))
        .unwrap()
        .actions()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, ["apple", "mango", "zebra"]);
}

#[test]
fn overlay_action_replacement() {
    let mut o = OverlayBucket::root();
    let b = o.ensure_bucket(&p(&["b"]));
    b.set_action("k".into(), Action::Put(Value::raw(b"v".to_vec())));
    b.set_action("k".into(), Action::Del);
    assert!(matches!(b.action("k"), Some(Action::Del)));
}

#[test]
fn overlay_paths_track_position() {
    let mut o = OverlayBucket::root();
    let b = o.ensure_bucket(&p(&["x", "y"]));
    assert_eq!(b.path(), &p(&["x", "y"])[..]);
}
