//! Cursors over a [`Dict`].
//!
//! A [`DictIterator`] does not borrow the table; it is advanced by passing
//! the table to [`DictIterator::next`]. That lets a caller holding a safe
//! cursor add, find, and delete between steps. Traversal walks the primary
//! generation slot by slot, each chain head to tail, then the incoming
//! generation if a rehash is in progress.

use crate::dict::{Dict, Handle};
use crate::dict_type::DictType;
use crate::pause::{PauseClaim, RehashPause};
use core::iter::FusedIterator;
use slotmap::DefaultKey;

/// Explicit cursor over a table; see [`Dict::iterator`].
///
/// Between steps a safe cursor tolerates any deletion. It follows the
/// live link of the entry it last returned; if that entry is gone it
/// falls back to the successor captured when the entry was returned,
/// and if that is gone too it re-walks the slot, skipping entries it has
/// already returned.
#[derive(Debug)]
pub struct DictIterator {
    pause: RehashPause,
    safe: bool,
    started: bool,
    table: usize,
    // `None` until the first slot is visited.
    index: Option<usize>,
    entry: Option<DefaultKey>,
    next_entry: Option<DefaultKey>,
    // Entries already returned from the current slot.
    returned: Vec<DefaultKey>,
    claim: Option<PauseClaim>,
    fingerprint: Option<u64>,
}

impl DictIterator {
    pub(crate) fn new(pause: RehashPause, safe: bool) -> Self {
        Self {
            pause,
            safe,
            started: false,
            table: 0,
            index: None,
            entry: None,
            next_entry: None,
            returned: Vec::new(),
            claim: None,
            fingerprint: None,
        }
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Advances to the next entry.
    ///
    /// # Panics
    ///
    /// If `dict` is not the table this cursor was opened on.
    pub fn next<K, V, T>(&mut self, dict: &Dict<K, V, T>) -> Option<Handle>
    where
        T: DictType<K, V>,
    {
        assert!(
            self.pause.same_table(&dict.pause),
            "iterator advanced against a table it was not opened on"
        );
        loop {
            let candidate = match self.entry {
                Some(cur) => self.successor(dict, cur),
                None => {
                    if !self.started {
                        self.started = true;
                        if self.safe {
                            self.claim = Some(self.pause.claim());
                        } else if cfg!(debug_assertions) {
                            self.fingerprint = Some(dict.fingerprint());
                        }
                    }
                    let mut idx = self.index.map_or(0, |i| i.saturating_add(1));
                    if idx >= dict.tables[self.table].size() {
                        if dict.is_rehashing() && self.table == 0 {
                            self.table = 1;
                            idx = 0;
                        } else {
                            self.index = Some(idx);
                            return None;
                        }
                    }
                    self.index = Some(idx);
                    self.returned.clear();
                    dict.tables[self.table].head(idx)
                }
            };

            match candidate.and_then(|id| dict.entries.get(id).map(|e| (id, e.next))) {
                Some((id, next)) => {
                    self.entry = Some(id);
                    self.next_entry = next;
                    self.returned.push(id);
                    return Some(Handle(id));
                }
                None => self.entry = None,
            }
        }
    }

    // Next entry of the current chain after `cur`, the last one returned.
    fn successor<K, V, T>(&self, dict: &Dict<K, V, T>, cur: DefaultKey) -> Option<DefaultKey>
    where
        T: DictType<K, V>,
    {
        if let Some(e) = dict.entries.get(cur) {
            return e.next;
        }
        if let Some(next) = self.next_entry.filter(|&n| dict.entries.contains_key(n)) {
            return Some(next);
        }
        let mut walk = dict.tables[self.table].head(self.index?);
        while let Some(id) = walk {
            if !self.returned.contains(&id) {
                return Some(id);
            }
            walk = dict.entries.get(id)?.next;
        }
        None
    }

    /// Ends the scan. A safe cursor lifts its rehash pause; a scan-only
    /// cursor checks (in debug builds) that the table was left untouched.
    ///
    /// # Panics
    ///
    /// In debug builds, if a scan-only cursor sees that the table changed.
    pub fn release<K, V, T>(self, dict: &Dict<K, V, T>)
    where
        T: DictType<K, V>,
    {
        if let Some(fp) = self.fingerprint {
            assert_eq!(
                fp,
                dict.fingerprint(),
                "table modified while a scan-only iterator was open"
            );
        }
    }
}

/// Borrowing iterator over `(handle, key, value)`; see [`Dict::iter`].
pub struct Iter<'a, K, V, T>
where
    T: DictType<K, V>,
{
    dict: &'a Dict<K, V, T>,
    cursor: DictIterator,
    remaining: usize,
}

impl<'a, K, V, T> Iter<'a, K, V, T>
where
    T: DictType<K, V>,
{
    pub(crate) fn new(dict: &'a Dict<K, V, T>) -> Self {
        Self {
            dict,
            cursor: dict.iterator(false),
            remaining: dict.len(),
        }
    }
}

impl<'a, K, V, T> Iterator for Iter<'a, K, V, T>
where
    T: DictType<K, V>,
{
    type Item = (Handle, &'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let dict = self.dict;
        let h = self.cursor.next(dict)?;
        let (k, v) = dict.get_key_value(h)?;
        self.remaining = self.remaining.saturating_sub(1);
        Some((h, k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, T> ExactSizeIterator for Iter<'_, K, V, T> where T: DictType<K, V> {}

impl<K, V, T> FusedIterator for Iter<'_, K, V, T> where T: DictType<K, V> {}

#[cfg(test)]
mod tests {
    use crate::dict::Dict;
    use crate::dict_type::DictType;
    use crate::policy::{ResizeGate, ResizePolicy};
    use std::collections::BTreeSet;

    fn filled(n: u32) -> Dict<u32, u32> {
        let mut d = Dict::new();
        for i in 0..n {
            d.add(i, i).unwrap();
        }
        d
    }

    fn scan(d: &Dict<u32, u32>, safe: bool) -> Vec<u32> {
        let mut it = d.iterator(safe);
        let mut out = Vec::new();
        while let Some(h) = it.next(d) {
            out.push(*h.key(d).unwrap());
        }
        it.release(d);
        out
    }

    #[test]
    fn empty_table_yields_nothing() {
        let d: Dict<u32, u32> = Dict::new();
        assert!(scan(&d, false).is_empty());
        assert!(scan(&d, true).is_empty());
        assert_eq!(d.iter().count(), 0);
    }

    #[test]
    fn scan_covers_both_generations_once() {
        let mut d = filled(100);
        while d.rehash(100) {}
        let size = d.table_sizes().0;
        d.begin_resize(size * 2).unwrap();
        d.rehash(10);
        assert!(d.is_rehashing());
        for safe in [false, true] {
            let seen = scan(&d, safe);
            assert_eq!(seen.len(), 100);
            let set: BTreeSet<u32> = seen.into_iter().collect();
            assert_eq!(set, (0..100).collect());
        }
        assert_eq!(d.iter().len(), 100);
    }

    #[test]
    fn deleting_current_entry_is_safe() {
        let mut d = filled(64);
        let mut it = d.iterator(true);
        let mut visited = 0;
        while let Some(h) = it.next(&d) {
            visited += 1;
            if h.key(&d).unwrap() % 2 == 0 {
                d.delete_entry(h, true).unwrap();
            }
        }
        it.release(&d);
        assert_eq!(visited, 64);
        assert_eq!(d.len(), 32);
        assert!(d.keys().all(|k| k % 2 == 1));
    }

    /// Every key shares slot 0.
    struct OneChain;

    impl DictType<u32, u32> for OneChain {
        fn hash(&self, _key: &u32) -> u32 {
            0
        }
        fn key_eq(&self, a: &u32, b: &u32) -> bool {
            a == b
        }
    }

    // Sized so that no growth reorders the chain.
    fn one_chain(n: u32) -> Dict<u32, u32, OneChain> {
        let policy = ResizePolicy::new()
            .with_initial_size(64)
            .with_gate(ResizeGate::new(true));
        let mut d = Dict::with_policy(OneChain, policy);
        for i in 0..n {
            d.add(i, i).unwrap();
        }
        assert!(!d.is_rehashing());
        d
    }

    // Chain is newest first: 7 -> 6 -> ... -> 0.
    #[test]
    fn deleting_the_next_entry_keeps_the_rest_of_the_chain() {
        let mut d = one_chain(8);
        let mut it = d.iterator(true);
        let mut seen = Vec::new();
        while let Some(h) = it.next(&d) {
            let k = *h.key(&d).unwrap();
            seen.push(k);
            if k == 7 {
                d.delete(&6).unwrap();
                d.delete(&3).unwrap();
            }
        }
        it.release(&d);
        assert_eq!(seen, vec![7, 5, 4, 2, 1, 0]);
    }

    #[test]
    fn deleting_current_and_next_entry_rewalks_the_slot() {
        let mut d = one_chain(8);
        let mut it = d.iterator(true);
        let mut seen = Vec::new();
        while let Some(h) = it.next(&d) {
            let k = *h.key(&d).unwrap();
            seen.push(k);
            if k == 6 {
                d.delete_entry(h, true).unwrap();
                d.delete(&5).unwrap();
            }
        }
        it.release(&d);
        assert_eq!(seen, vec![7, 6, 4, 3, 2, 1, 0]);
        let left: BTreeSet<u32> = d.keys().copied().collect();
        assert_eq!(left, [0, 1, 2, 3, 4, 7].into_iter().collect());
    }

    #[test]
    fn deleting_unvisited_entries_loses_no_survivors() {
        let mut d = filled(200);
        let mut it = d.iterator(true);
        let mut seen = BTreeSet::new();
        let mut step = 0u32;
        while let Some(h) = it.next(&d) {
            assert!(seen.insert(*h.key(&d).unwrap()));
            // Knock out a spread of other keys, visited or not.
            let victim = (step * 37) % 200;
            let _ = d.delete(&victim);
            step += 1;
        }
        it.release(&d);
        for k in d.keys() {
            assert!(seen.contains(k), "live key {k} never returned");
        }
    }

    #[test]
    fn safe_cursor_claims_on_first_advance_and_releases_on_drop() {
        let d = filled(10);
        let mut it = d.iterator(true);
        assert!(it.is_safe());
        assert_eq!(d.paused_iterators(), 0);
        it.next(&d);
        assert_eq!(d.paused_iterators(), 1);
        drop(it);
        assert_eq!(d.paused_iterators(), 0);

        // Never advanced: nothing to release.
        let it = d.iterator(true);
        it.release(&d);
        assert_eq!(d.paused_iterators(), 0);
    }

    #[test]
    fn exhausted_cursor_stays_exhausted() {
        let d = filled(3);
        let mut it = d.iterator(false);
        while it.next(&d).is_some() {}
        assert!(it.next(&d).is_none());
        assert!(it.next(&d).is_none());
        it.release(&d);
    }

    #[test]
    #[should_panic(expected = "not opened on")]
    fn cursor_is_bound_to_its_table() {
        let a = filled(2);
        let b = filled(2);
        let mut it = a.iterator(false);
        it.next(&b);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn scan_only_cursor_detects_mutation() {
        let mut d = filled(8);
        let mut it = d.iterator(false);
        it.next(&d);
        d.add(100, 100).unwrap();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| it.release(&d)));
        assert!(res.is_err(), "expected fingerprint mismatch to panic");
    }
}
