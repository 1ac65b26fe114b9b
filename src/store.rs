//! Watch-fed cache of Stream objects
//!
//! Populated by the watch loop and read by the reconciler. The reconciler
//! never mutates cached objects in place; it deep-copies before any
//! mutate-and-persist sequence.

use crate::crd::Stream;
use crate::error::{OperatorError, Result};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Compute the stable `namespace/name` identifier for a Stream.
pub fn object_key(stream: &Stream) -> String {
    let namespace = stream.namespace().unwrap_or_else(|| "default".to_string());
    format!("{}/{}", namespace, stream.name_any())
}

/// Split a `namespace/name` identifier back into its parts.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
            Ok((namespace, name))
        }
        _ => Err(OperatorError::InvalidKey(format!(
            "unexpected key format: {key:?}"
        ))),
    }
}

/// In-memory cache of the watched Stream objects.
#[derive(Default)]
pub struct StreamStore {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<Stream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<Stream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert or replace an object, returning the previous version if any.
    pub fn insert(&self, stream: Stream) -> Option<Arc<Stream>> {
        let key = object_key(&stream);
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(stream))
    }

    pub fn remove(&self, stream: &Stream) -> Option<Arc<Stream>> {
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&object_key(stream))
    }

    /// Replace the whole cache from a fresh list (watch re-initialization).
    pub fn replace_all(&self, streams: Vec<Stream>) {
        let next: HashMap<String, Arc<Stream>> = streams
            .into_iter()
            .map(|s| (object_key(&s), Arc::new(s)))
            .collect();
        *self
            .streams
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    pub fn len(&self) -> usize {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::StreamSpec;

    fn stream(namespace: &str, name: &str) -> Stream {
        let spec: StreamSpec = serde_json::from_str(r#"{"name": "orders"}"#).unwrap();
        let mut s = Stream::new(name, spec);
        s.metadata.namespace = Some(namespace.to_string());
        s
    }

    #[test]
    fn test_object_key_is_namespace_slash_name() {
        let s = stream("prod", "orders-stream");
        assert_eq!(object_key(&s), "prod/orders-stream");
    }

    #[test]
    fn test_split_key_roundtrip() {
        let (namespace, name) = split_key("prod/orders-stream").unwrap();
        assert_eq!(namespace, "prod");
        assert_eq!(name, "orders-stream");
    }

    #[test]
    fn test_split_key_rejects_junk() {
        assert!(split_key("no-slash").is_err());
        assert!(split_key("/name-only").is_err());
        assert!(split_key("ns-only/").is_err());
    }

    #[test]
    fn test_insert_get_remove() {
        let store = StreamStore::new();
        assert!(store.get("prod", "orders").is_none());

        store.insert(stream("prod", "orders"));
        assert!(store.get("prod", "orders").is_some());
        assert_eq!(store.len(), 1);

        let prev = store.insert(stream("prod", "orders"));
        assert!(prev.is_some());
        assert_eq!(store.len(), 1);

        store.remove(&stream("prod", "orders"));
        assert!(store.get("prod", "orders").is_none());
    }

    #[test]
    fn test_replace_all() {
        let store = StreamStore::new();
        store.insert(stream("prod", "stale"));
        store.replace_all(vec![stream("prod", "a"), stream("prod", "b")]);
        assert_eq!(store.len(), 2);
        assert!(store.get("prod", "stale").is_none());
    }
}
