//! Type descriptors: the hash/compare/dup/destroy behavior bound to a table.

use crate::hash;
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

/// Behavior a table uses to place, compare, and release its keys and values.
///
/// A descriptor is bound when the table is created and never changes
/// afterwards. The descriptor value itself is the table's context: any
/// state a hook needs lives in `self`.
pub trait DictType<K, V> {
    fn hash(&self, key: &K) -> u32;

    fn key_eq(&self, a: &K, b: &K) -> bool;

    /// Applied to a key right before it is stored.
    fn dup_key(&self, key: K) -> K {
        key
    }

    /// Applied to a value right before it is stored.
    fn dup_val(&self, val: V) -> V {
        val
    }

    /// Releases a key the table owned. Not called for keys handed back
    /// to the caller by [`Dict::delete_no_free`](crate::Dict::delete_no_free).
    fn destroy_key(&self, key: K) {
        drop(key);
    }

    fn destroy_val(&self, val: V) {
        drop(val);
    }
}

/// Descriptor for any `K: Hash + Eq`, hashing with SipHash keyed by the
/// process-wide hash seed.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdType;

impl<K: Hash + Eq, V> DictType<K, V> for StdType {
    fn hash(&self, key: &K) -> u32 {
        let mut h = DefaultHasher::new();
        Hash::hash(&hash::hash_seed(), &mut h);
        Hash::hash(key, &mut h);
        hash::fold64(h.finish())
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Descriptor for byte-string keys using the seeded Bernstein hash.
#[derive(Copy, Clone, Debug, Default)]
pub struct BytesType;

impl<K: AsRef<[u8]> + Eq, V> DictType<K, V> for BytesType {
    fn hash(&self, key: &K) -> u32 {
        hash::gen_hash(key.as_ref())
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Descriptor for string keys that treats ASCII case as insignificant.
#[derive(Copy, Clone, Debug, Default)]
pub struct CaseInsensitiveType;

impl<K: AsRef<str>, V> DictType<K, V> for CaseInsensitiveType {
    fn hash(&self, key: &K) -> u32 {
        hash::gen_case_hash(key.as_ref().as_bytes())
    }

    fn key_eq(&self, a: &K, b: &K) -> bool {
        a.as_ref().eq_ignore_ascii_case(b.as_ref())
    }
}

/// Descriptor for `u32` keys through Thomas Wang's integer mix.
#[derive(Copy, Clone, Debug, Default)]
pub struct IntType;

impl<V> DictType<u32, V> for IntType {
    fn hash(&self, key: &u32) -> u32 {
        hash::int_hash(*key)
    }

    fn key_eq(&self, a: &u32, b: &u32) -> bool {
        a == b
    }
}
