//! Value slots and per-bucket codecs.
//!
//! A value is either the raw bytes recovered from the log (the bucket's
//! codec was not yet registered) or a typed payload supplied by the caller.
//! Raw values are promoted to typed ones when a codec arrives.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Boxed error type carried by user-supplied codecs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Serializes a typed payload into a log-record body.
pub type MarshalFn = Arc<dyn Fn(&dyn Payload) -> Result<Vec<u8>, BoxError> + Send + Sync>;

/// Reconstructs a typed payload from a log-record body.
pub type UnmarshalFn = Arc<dyn Fn(&[u8]) -> Result<Arc<dyn Payload>, BoxError> + Send + Sync>;

/// A typed value that knows how to duplicate itself.
///
/// The blanket impl makes any `Clone + Send + Sync + 'static` type a
/// payload, so callers rarely implement this by hand.
pub trait Payload: Any + Send + Sync {
    /// Deep copy, used when copy-on-read or copy-on-write is configured.
    fn dup(&self) -> Arc<dyn Payload>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Clone + Send + Sync> Payload for T {
    fn dup(&self) -> Arc<dyn Payload> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A stored value: raw recovered bytes or a typed payload.
///
/// `clone` is shallow (the payload is shared); [`Value::dup`] is the deep
/// copy selected by the copy-on-read / copy-on-write options.
#[derive(Clone)]
pub enum Value {
    Raw(Arc<Vec<u8>>),
    Typed(Arc<dyn Payload>),
}

impl Value {
    pub fn raw<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Value::Raw(Arc::new(bytes.into()))
    }

    pub fn typed<P: Payload>(payload: P) -> Self {
        Value::Typed(Arc::new(payload))
    }

    pub fn from_payload(payload: Arc<dyn Payload>) -> Self {
        Value::Typed(payload)
    }

    /// Deep copy. Raw bytes duplicate by copy; typed payloads via
    /// [`Payload::dup`].
    pub fn dup(&self) -> Self {
        match self {
            Value::Raw(b) => Value::Raw(Arc::new(b.as_ref().clone())),
            Value::Typed(p) => Value::Typed(p.dup()),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Value::Raw(_))
    }

    /// The raw bytes, when this value has not been promoted.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(b) => Some(b.as_slice()),
            Value::Typed(_) => None,
        }
    }

    /// Downcasts a typed payload to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Typed(p) => p.as_any().downcast_ref::<T>(),
            Value::Raw(_) => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Raw(b) => f.debug_tuple("Raw").field(&b.len()).finish(),
            Value::Typed(_) => f.write_str("Typed(..)"),
        }
    }
}
