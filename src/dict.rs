//! Dict: the table pair, its incremental rehash engine, and the keyed operations.

use crate::dict_type::{DictType, StdType};
use crate::error::{DictError, RefuseReason, Result};
use crate::iter::{DictIterator, Iter};
use crate::pause::RehashPause;
use crate::policy::{Growth, ResizePolicy, REHASH_BATCH};
use crate::stats::{DictStats, TableStats};
use crate::table::{Arena, Entry, Table};
use core::fmt;
use core::hash::{Hash, Hasher};
use rand::Rng;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::DefaultHasher;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Stable reference to one entry of a [`Dict`].
///
/// Handles stay valid while the entry is moved between generations and
/// stop resolving once it is deleted; a later entry never reuses one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(pub(crate) DefaultKey);

impl Handle {
    pub fn key<'a, K, V, T>(&self, dict: &'a Dict<K, V, T>) -> Option<&'a K>
    where
        T: DictType<K, V>,
    {
        dict.key(*self)
    }

    pub fn value<'a, K, V, T>(&self, dict: &'a Dict<K, V, T>) -> Option<&'a V>
    where
        T: DictType<K, V>,
    {
        dict.value(*self)
    }

    pub fn value_mut<'a, K, V, T>(&self, dict: &'a mut Dict<K, V, T>) -> Option<&'a mut V>
    where
        T: DictType<K, V>,
    {
        dict.value_mut(*self)
    }
}

// Where a key lives, or where it would be linked.
enum Position {
    Occupied(DefaultKey),
    Vacant { gen: usize, slot: usize, hash: u32 },
}

/// Chained hash table that resizes by moving a few buckets at a time.
///
/// `tables[0]` is the primary generation and `tables[1]` the rehash
/// destination. `rehash_idx` is `None` when stable; otherwise every
/// primary slot below it has already been migrated.
pub struct Dict<K, V, T: DictType<K, V> = StdType> {
    ty: Rc<T>,
    policy: ResizePolicy,
    pub(crate) tables: [Table; 2],
    pub(crate) rehash_idx: Option<usize>,
    pub(crate) entries: Arena<K, V>,
    pub(crate) pause: RehashPause,
}

impl<K, V> Dict<K, V>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self::with_type(StdType)
    }
}

impl<K, V> Default for Dict<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, T> Dict<K, V, T>
where
    T: DictType<K, V>,
{
    /// Creates an empty table. No buckets are allocated until the first insertion.
    pub fn with_type(ty: T) -> Self {
        Self::with_shared_type(Rc::new(ty))
    }

    /// Creates an empty table sharing `ty` with other tables.
    pub fn with_shared_type(ty: Rc<T>) -> Self {
        Self::with_shared_type_and_policy(ty, ResizePolicy::default())
    }

    pub fn with_policy(ty: T, policy: ResizePolicy) -> Self {
        Self::with_shared_type_and_policy(Rc::new(ty), policy)
    }

    pub fn with_shared_type_and_policy(ty: Rc<T>, policy: ResizePolicy) -> Self {
        Self {
            ty,
            policy,
            tables: [Table::unallocated(), Table::unallocated()],
            rehash_idx: None,
            entries: SlotMap::with_key(),
            pause: RehashPause::new(),
        }
    }

    pub fn dict_type(&self) -> &Rc<T> {
        &self.ty
    }

    pub fn policy(&self) -> &ResizePolicy {
        &self.policy
    }

    /// Number of entries across both generations.
    pub fn len(&self) -> usize {
        let n = self.tables[0].used + self.tables[1].used;
        debug_assert_eq!(n, self.entries.len());
        n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bucket count across both generations.
    pub fn slots(&self) -> usize {
        self.tables[0].size() + self.tables[1].size()
    }

    /// Bucket counts of the primary and incoming generations.
    pub fn table_sizes(&self) -> (usize, usize) {
        (self.tables[0].size(), self.tables[1].size())
    }

    #[inline]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx.is_some()
    }

    /// Next primary slot to migrate, or `None` when not rehashing.
    pub fn rehash_cursor(&self) -> Option<usize> {
        self.rehash_idx
    }

    /// Number of safe iterators currently holding rehashing off.
    pub fn paused_iterators(&self) -> usize {
        self.pause.depth()
    }

    // ---------------------------------------------------------------
    // Resize and rehash
    // ---------------------------------------------------------------

    /// Starts rehashing into a generation of `next_power(size)` buckets, or
    /// allocates the primary generation if the table has none yet.
    pub fn begin_resize(&mut self, size: usize) -> Result<()> {
        if self.is_rehashing() {
            trace!(size, "resize refused: already rehashing");
            return Err(RefuseReason::Rehashing.into());
        }
        let used = self.tables[0].used;
        if used > size {
            trace!(size, used, "resize refused: target below used");
            return Err(RefuseReason::BelowUsed { target: size, used }.into());
        }
        let real = self.policy.next_power(size);
        let table = Table::with_size(real).ok_or(DictError::AllocationFailure { slots: real })?;
        if !self.tables[0].is_allocated() {
            trace!(size = real, "allocated primary table");
            self.tables[0] = table;
        } else {
            debug!(
                from = self.tables[0].size(),
                to = real,
                used,
                "begin incremental rehash"
            );
            self.tables[1] = table;
            self.rehash_idx = Some(0);
        }
        Ok(())
    }

    /// Shrinks (or grows) to the smallest table that holds the current entries.
    pub fn resize_to_fit(&mut self) -> Result<()> {
        if !self.tables[0].is_allocated() {
            return Err(DictError::Empty);
        }
        if self.is_rehashing() {
            return Err(RefuseReason::Rehashing.into());
        }
        let target = self.policy.fit_target(self.tables[0].used)?;
        self.begin_resize(target)
    }

    fn expand_if_needed(&mut self) -> Result<()> {
        if self.is_rehashing() {
            return Ok(());
        }
        match self.policy.growth(self.tables[0].size(), self.tables[0].used) {
            Growth::Hold => Ok(()),
            Growth::Allocate(size) => self.begin_resize(size),
            Growth::Expand { target, forced } => {
                if forced {
                    debug!(
                        size = self.tables[0].size(),
                        used = self.tables[0].used,
                        "resize gate closed; forcing growth past ratio"
                    );
                }
                self.begin_resize(target)
            }
        }
    }

    /// Migrates up to `n` non-empty primary slots. Returns true while
    /// rehashing still has work left.
    ///
    /// Does nothing while a safe iterator is open.
    pub fn rehash(&mut self, n: usize) -> bool {
        if !self.pause.is_paused() {
            self.migrate(n);
        }
        self.is_rehashing()
    }

    /// Rehashes in batches of [`REHASH_BATCH`] slots until done or until
    /// `budget` has elapsed. Returns the number of slots migrated.
    pub fn rehash_for(&mut self, budget: Duration) -> usize {
        if self.pause.is_paused() {
            return 0;
        }
        let start = Instant::now();
        let mut migrated = 0;
        while self.is_rehashing() {
            migrated += self.migrate(REHASH_BATCH);
            if start.elapsed() > budget {
                break;
            }
        }
        trace!(
            migrated,
            elapsed_us = start.elapsed().as_micros() as u64,
            done = !self.is_rehashing(),
            "timed rehash"
        );
        migrated
    }

    // The per-operation amortization tax.
    #[inline]
    fn rehash_step(&mut self) {
        if !self.pause.is_paused() {
            self.migrate(1);
        }
    }

    fn migrate(&mut self, n: usize) -> usize {
        let Some(mut idx) = self.rehash_idx else {
            return 0;
        };
        let mut moved = 0;
        while moved < n && self.tables[0].used > 0 {
            let [old, new] = &mut self.tables;
            loop {
                assert!(
                    idx < old.size(),
                    "rehash cursor {idx} ran past a table of {} slots",
                    old.size()
                );
                if old.head(idx).is_some() {
                    break;
                }
                idx += 1;
            }
            let mut cur = old.take_chain(idx);
            while let Some(id) = cur {
                let e = &self.entries[id];
                cur = e.next;
                let slot = new.slot_of(e.hash);
                new.push_front(&mut self.entries, slot, id);
                old.used -= 1;
            }
            idx += 1;
            moved += 1;
            self.rehash_idx = Some(idx);
        }
        if self.tables[0].used == 0 {
            self.finish_rehash();
        }
        moved
    }

    fn finish_rehash(&mut self) {
        let incoming = core::mem::replace(&mut self.tables[1], Table::unallocated());
        self.tables[0] = incoming;
        self.rehash_idx = None;
        debug!(
            size = self.tables[0].size(),
            used = self.tables[0].used,
            "incremental rehash complete"
        );
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    fn lookup(&self, hash: u32, key: &K) -> Option<DefaultKey> {
        let ty = &self.ty;
        for gen in 0..=1 {
            if let Some(id) = self.tables[gen].find(&self.entries, hash, |k| ty.key_eq(key, k)) {
                return Some(id);
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    pub fn find(&mut self, key: &K) -> Option<Handle> {
        if !self.tables[0].is_allocated() {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let hash = T::hash(&self.ty, key);
        self.lookup(hash, key).map(Handle)
    }

    pub fn contains_key(&mut self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn fetch_value(&mut self, key: &K) -> Option<&V> {
        let h = self.find(key)?;
        self.value(h)
    }

    pub fn fetch_value_mut(&mut self, key: &K) -> Option<&mut V> {
        let h = self.find(key)?;
        self.value_mut(h)
    }

    pub fn key(&self, h: Handle) -> Option<&K> {
        self.entries.get(h.0).map(|e| &e.key)
    }

    pub fn value(&self, h: Handle) -> Option<&V> {
        self.entries.get(h.0).map(|e| &e.value)
    }

    pub fn value_mut(&mut self, h: Handle) -> Option<&mut V> {
        self.entries.get_mut(h.0).map(|e| &mut e.value)
    }

    pub fn get_key_value(&self, h: Handle) -> Option<(&K, &V)> {
        self.entries.get(h.0).map(|e| (&e.key, &e.value))
    }

    // ---------------------------------------------------------------
    // Insertion
    // ---------------------------------------------------------------

    fn position_of(&mut self, key: &K) -> Result<Position> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.expand_if_needed()?;
        let hash = T::hash(&self.ty, key);
        if let Some(id) = self.lookup(hash, key) {
            return Ok(Position::Occupied(id));
        }
        // New keys always go to the generation being filled.
        let gen = usize::from(self.is_rehashing());
        let slot = self.tables[gen].slot_of(hash);
        Ok(Position::Vacant { gen, slot, hash })
    }

    fn link_new(&mut self, gen: usize, slot: usize, hash: u32, key: K, value: V) -> Handle {
        let key = self.ty.dup_key(key);
        let value = self.ty.dup_val(value);
        let id = self.entries.insert(Entry {
            key,
            value,
            hash,
            next: None,
        });
        self.tables[gen].push_front(&mut self.entries, slot, id);
        Handle(id)
    }

    /// Adds `key`, building its value with `default` only if the key is absent.
    pub fn add_with<F>(&mut self, key: K, default: F) -> Result<Handle>
    where
        F: FnOnce() -> V,
    {
        match self.position_of(&key)? {
            Position::Occupied(_) => Err(DictError::AlreadyExists),
            Position::Vacant { gen, slot, hash } => Ok(self.link_new(gen, slot, hash, key, default())),
        }
    }

    pub fn add(&mut self, key: K, value: V) -> Result<()> {
        self.add_with(key, || value).map(|_| ())
    }

    /// Adds `key` with a default value and returns its entry for the caller to fill in.
    pub fn add_raw(&mut self, key: K) -> Result<Handle>
    where
        V: Default,
    {
        self.add_with(key, V::default)
    }

    /// Inserts or overwrites. Returns true if the key was newly added.
    ///
    /// On overwrite the new value is stored before the old one is destroyed.
    pub fn replace(&mut self, key: K, value: V) -> Result<bool> {
        match self.position_of(&key)? {
            Position::Vacant { gen, slot, hash } => {
                self.link_new(gen, slot, hash, key, value);
                Ok(true)
            }
            Position::Occupied(id) => {
                let value = self.ty.dup_val(value);
                let old = core::mem::replace(&mut self.entries[id].value, value);
                self.ty.destroy_val(old);
                Ok(false)
            }
        }
    }

    /// Returns the entry for `key`, adding it with `default()` if absent.
    pub fn find_or_insert_with<F>(&mut self, key: K, default: F) -> Result<Handle>
    where
        F: FnOnce() -> V,
    {
        match self.position_of(&key)? {
            Position::Occupied(id) => Ok(Handle(id)),
            Position::Vacant { gen, slot, hash } => Ok(self.link_new(gen, slot, hash, key, default())),
        }
    }

    pub fn replace_raw(&mut self, key: K) -> Result<Handle>
    where
        V: Default,
    {
        self.find_or_insert_with(key, V::default)
    }

    // ---------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------

    fn unlink_key(&mut self, key: &K) -> Result<Entry<K, V>> {
        if !self.tables[0].is_allocated() {
            return Err(DictError::Empty);
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let hash = T::hash(&self.ty, key);
        for gen in 0..=1 {
            let ty = &self.ty;
            if let Some(id) = self.tables[gen].find(&self.entries, hash, |k| ty.key_eq(key, k)) {
                return Ok(self.detach(gen, id));
            }
            if !self.is_rehashing() {
                break;
            }
        }
        Err(DictError::NotFound)
    }

    fn detach(&mut self, gen: usize, id: DefaultKey) -> Entry<K, V> {
        let table = &mut self.tables[gen];
        let slot = table.slot_of(self.entries[id].hash);
        let unlinked = table.unlink(&mut self.entries, slot, id);
        assert!(unlinked, "entry missing from the chain its hash selects");
        self.entries
            .remove(id)
            .expect("linked entry missing from the arena")
    }

    fn destroy_entry(&self, e: Entry<K, V>) {
        self.ty.destroy_key(e.key);
        self.ty.destroy_val(e.value);
    }

    /// Removes `key`, running the descriptor's destructors on its contents.
    ///
    /// Fails with [`DictError::Empty`] if the table has no buckets at all,
    /// and with [`DictError::NotFound`] if the key is absent.
    pub fn delete(&mut self, key: &K) -> Result<()> {
        let e = self.unlink_key(key)?;
        self.destroy_entry(e);
        Ok(())
    }

    /// Removes `key` and hands its contents back without destroying them.
    pub fn delete_no_free(&mut self, key: &K) -> Result<(K, V)> {
        let e = self.unlink_key(key)?;
        Ok((e.key, e.value))
    }

    fn unlink_handle(&mut self, h: Handle) -> Result<Entry<K, V>> {
        if !self.tables[0].is_allocated() {
            return Err(DictError::Empty);
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let hash = self.entries.get(h.0).ok_or(DictError::NotFound)?.hash;
        for gen in 0..=1 {
            let table = &mut self.tables[gen];
            if !table.is_allocated() {
                continue;
            }
            let slot = table.slot_of(hash);
            if table.unlink(&mut self.entries, slot, h.0) {
                return self.entries.remove(h.0).ok_or(DictError::NotFound);
            }
        }
        Err(DictError::NotFound)
    }

    /// Deletes the entry behind `h`. With `release` set the descriptor's
    /// `destroy_key`/`destroy_val` hooks run. Without it only those hooks are
    /// skipped: the key and value are still dropped here. Use
    /// [`Dict::take_entry`] to keep them.
    ///
    /// This is how an iterating caller removes the entry it was just given.
    pub fn delete_entry(&mut self, h: Handle, release: bool) -> Result<()> {
        let e = self.unlink_handle(h)?;
        if release {
            self.destroy_entry(e);
        }
        Ok(())
    }

    /// Removes the entry behind `h` and returns its contents.
    pub fn take_entry(&mut self, h: Handle) -> Result<(K, V)> {
        let e = self.unlink_handle(h)?;
        Ok((e.key, e.value))
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut it = self.iterator(true);
        while let Some(h) = it.next(self) {
            let e = &mut self.entries[h.0];
            if !keep(&e.key, &mut e.value) {
                self.delete_entry(h, true)
                    .expect("entry returned by the cursor is still linked");
            }
        }
        it.release(self);
    }

    /// Destroys every entry and deallocates both generations.
    ///
    /// Open safe iterators keep their pause; they simply find nothing left.
    pub fn clear(&mut self) {
        self.tables = [Table::unallocated(), Table::unallocated()];
        self.rehash_idx = None;
        for (_, e) in self.entries.drain() {
            self.ty.destroy_key(e.key);
            self.ty.destroy_val(e.value);
        }
    }

    // ---------------------------------------------------------------
    // Sampling and iteration
    // ---------------------------------------------------------------

    /// Returns a uniformly chosen entry using the thread-local RNG.
    pub fn random_entry(&mut self) -> Option<Handle> {
        self.random_entry_with(&mut rand::rng())
    }

    /// Picks a random non-empty bucket by rejection over both generations'
    /// capacity, then a random entry of its chain.
    pub fn random_entry_with<R: Rng>(&mut self, rng: &mut R) -> Option<Handle> {
        if self.is_empty() {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let (gen, slot) = if self.is_rehashing() {
            let primary = self.tables[0].size();
            let total = primary + self.tables[1].size();
            loop {
                let h = rng.random_range(0..total);
                let (gen, slot) = if h >= primary { (1, h - primary) } else { (0, h) };
                if self.tables[gen].head(slot).is_some() {
                    break (gen, slot);
                }
            }
        } else {
            let size = self.tables[0].size();
            loop {
                let slot = rng.random_range(0..size);
                if self.tables[0].head(slot).is_some() {
                    break (0, slot);
                }
            }
        };
        let table = &self.tables[gen];
        let len = table.chain_len(&self.entries, slot);
        let pick = rng.random_range(0..len);
        table.nth_in_chain(&self.entries, slot, pick).map(Handle)
    }

    /// Opens a cursor. A safe cursor pauses rehashing from its first
    /// advance until it is released or dropped, and tolerates any mutation
    /// in between; a scan-only cursor requires the table to stay untouched.
    pub fn iterator(&self, safe: bool) -> DictIterator {
        DictIterator::new(self.pause.clone(), safe)
    }

    pub fn iter(&self) -> Iter<'_, K, V, T> {
        Iter::new(self)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(_, k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, _, v)| v)
    }

    /// Summary of the structural state; changes whenever the table does.
    pub(crate) fn fingerprint(&self) -> u64 {
        let mut h = DefaultHasher::new();
        (
            self.tables[0].size(),
            self.tables[0].used,
            self.tables[1].size(),
            self.tables[1].used,
            self.rehash_idx,
        )
            .hash(&mut h);
        h.finish()
    }

    /// Chain-length statistics for each live generation.
    pub fn stats(&self) -> DictStats {
        DictStats {
            primary: TableStats::collect(&self.tables[0], &self.entries),
            incoming: self
                .is_rehashing()
                .then(|| TableStats::collect(&self.tables[1], &self.entries)),
        }
    }
}

impl<K, V, T> Drop for Dict<K, V, T>
where
    T: DictType<K, V>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, T> fmt::Debug for Dict<K, V, T>
where
    K: fmt::Debug,
    V: fmt::Debug,
    T: DictType<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(_, k, v)| (k, v)))
            .finish()
    }
}

impl<'a, K, V, T> IntoIterator for &'a Dict<K, V, T>
where
    T: DictType<K, V>,
{
    type Item = (Handle, &'a K, &'a V);
    type IntoIter = Iter<'a, K, V, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
