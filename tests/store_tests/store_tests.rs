//! Tests for KeyValueStore
//!
//! These tests verify:
//! - Basic get/set/delete operations
//! - Absence as a first-class result
//! - Concurrent access from many threads

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use respkv::KeyValueStore;

fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_store_set_get() {
    let store = KeyValueStore::new();

    store.set(b("hello"), b("world"));

    assert_eq!(store.get(b"hello"), Some(b("world")));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_get_nonexistent_key() {
    let store = KeyValueStore::new();
    assert_eq!(store.get(b"nonexistent"), None);
}

#[test]
fn test_store_overwrite() {
    let store = KeyValueStore::new();

    store.set(b("key"), b("v1"));
    store.set(b("key"), b("v2"));

    assert_eq!(store.get(b"key"), Some(b("v2")));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_delete_reports_presence() {
    let store = KeyValueStore::new();
    store.set(b("key"), b("value"));

    assert!(store.delete(b"key"));
    assert_eq!(store.get(b"key"), None);
    assert!(!store.delete(b"key"));
    assert!(store.is_empty());
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_store_empty_key_and_value() {
    let store = KeyValueStore::new();

    store.set(b(""), b("empty_key_value"));
    store.set(b("empty_value"), b(""));

    assert_eq!(store.get(b""), Some(b("empty_key_value")));
    assert_eq!(store.get(b"empty_value"), Some(Bytes::new()));
}

#[test]
fn test_store_binary_data() {
    let store = KeyValueStore::new();

    let key = Bytes::from_static(b"\x00\x01\x02\xFF\xFE");
    let value = Bytes::from_static(b"\xFF\x00\xAB\xCD\x00");

    store.set(key.clone(), value.clone());
    assert_eq!(store.get(&key), Some(value));
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_store_concurrent_writes() {
    let store = Arc::new(KeyValueStore::new());

    let mut handles = vec![];
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                store.set(b(&format!("thread{}_key{}", t, i)), b(&format!("value{}", i)));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 1000);
    for t in 0..4 {
        for i in 0..250 {
            let key = format!("thread{}_key{}", t, i);
            assert_eq!(store.get(key.as_bytes()), Some(b(&format!("value{}", i))));
        }
    }
}

#[test]
fn test_store_concurrent_delete_succeeds_once() {
    let store = Arc::new(KeyValueStore::new());
    for i in 0..100 {
        store.set(b(&format!("key{}", i)), b("v"));
    }

    let mut handles = vec![];
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            (0..100)
                .filter(|i| store.delete(format!("key{}", i).as_bytes()))
                .count()
        }));
    }

    let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(removed, 100);
    assert!(store.is_empty());
}
