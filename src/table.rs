//! One bucket-array generation and the chain primitives over the entry arena.
//!
//! Entries live in a single `SlotMap` owned by the table pair. A bucket
//! holds the arena key of its chain head; each entry holds the key of the
//! next entry in the same chain. Moving an entry between generations only
//! rewrites links, never the entry's storage.

use slotmap::{DefaultKey, SlotMap};

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    // Cached descriptor hash so migration never calls back into user code.
    pub(crate) hash: u32,
    pub(crate) next: Option<DefaultKey>,
}

pub(crate) type Arena<K, V> = SlotMap<DefaultKey, Entry<K, V>>;

/// A power-of-two array of chain heads. An unallocated generation has size 0.
#[derive(Debug, Default)]
pub(crate) struct Table {
    buckets: Vec<Option<DefaultKey>>,
    mask: usize,
    pub(crate) used: usize,
}

impl Table {
    pub(crate) const fn unallocated() -> Self {
        Self {
            buckets: Vec::new(),
            mask: 0,
            used: 0,
        }
    }

    /// Allocates `size` empty buckets; `size` must be a power of two.
    /// Returns `None` if the allocator refuses.
    pub(crate) fn with_size(size: usize) -> Option<Self> {
        assert!(size.is_power_of_two(), "bucket count {size} is not a power of two");
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(size).ok()?;
        buckets.resize(size, None);
        Some(Self {
            buckets,
            mask: size - 1,
            used: 0,
        })
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn is_allocated(&self) -> bool {
        !self.buckets.is_empty()
    }

    #[inline]
    pub(crate) fn slot_of(&self, hash: u32) -> usize {
        hash as usize & self.mask
    }

    /// Chain head of `slot`, or `None` when empty or out of range.
    #[inline]
    pub(crate) fn head(&self, slot: usize) -> Option<DefaultKey> {
        self.buckets.get(slot).copied().flatten()
    }

    /// Links `id` at the head of `slot`'s chain.
    pub(crate) fn push_front<K, V>(&mut self, arena: &mut Arena<K, V>, slot: usize, id: DefaultKey) {
        arena[id].next = self.buckets[slot];
        self.buckets[slot] = Some(id);
        self.used += 1;
    }

    /// First entry in the chain for `hash` that satisfies `eq`.
    pub(crate) fn find<K, V>(
        &self,
        arena: &Arena<K, V>,
        hash: u32,
        mut eq: impl FnMut(&K) -> bool,
    ) -> Option<DefaultKey> {
        if !self.is_allocated() {
            return None;
        }
        let mut cur = self.head(self.slot_of(hash));
        while let Some(id) = cur {
            let e = &arena[id];
            if e.hash == hash && eq(&e.key) {
                return Some(id);
            }
            cur = e.next;
        }
        None
    }

    /// Unlinks `id` from the chain at `slot`. Returns false if it is not there.
    pub(crate) fn unlink<K, V>(&mut self, arena: &mut Arena<K, V>, slot: usize, id: DefaultKey) -> bool {
        let mut prev: Option<DefaultKey> = None;
        let mut cur = self.head(slot);
        while let Some(c) = cur {
            let next = arena[c].next;
            if c == id {
                match prev {
                    Some(p) => arena[p].next = next,
                    None => self.buckets[slot] = next,
                }
                arena[c].next = None;
                self.used -= 1;
                return true;
            }
            prev = Some(c);
            cur = next;
        }
        false
    }

    /// Detaches the whole chain at `slot` and returns its head.
    /// The entries stay counted in `used`; the caller moves or frees them.
    pub(crate) fn take_chain(&mut self, slot: usize) -> Option<DefaultKey> {
        self.buckets[slot].take()
    }

    /// Number of entries chained at `slot`.
    pub(crate) fn chain_len<K, V>(&self, arena: &Arena<K, V>, slot: usize) -> usize {
        let mut n = 0;
        let mut cur = self.head(slot);
        while let Some(id) = cur {
            n += 1;
            cur = arena[id].next;
        }
        n
    }

    /// Walks `steps` links from the head of `slot`.
    pub(crate) fn nth_in_chain<K, V>(&self, arena: &Arena<K, V>, slot: usize, steps: usize) -> Option<DefaultKey> {
        let mut cur = self.head(slot);
        for _ in 0..steps {
            cur = arena[cur?].next;
        }
        cur
    }
}
