//! Rehash pause counter.
//!
//! A table and every safe cursor opened on it share one counter. While it
//! is nonzero, entries must stay in the generation they are in, so the
//! table skips all rehash work. Claims are RAII: dropping a cursor
//! without releasing it still lifts its pause.

use core::cell::Cell;
use std::rc::Rc;

/// Per-table pause counter. Cloning yields another handle to the same count.
#[derive(Clone, Debug, Default)]
pub(crate) struct RehashPause {
    depth: Rc<Cell<usize>>,
}

impl RehashPause {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn is_paused(&self) -> bool {
        self.depth.get() > 0
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Adds one pause; it lasts until the returned claim is dropped.
    pub(crate) fn claim(&self) -> PauseClaim {
        self.depth.set(self.depth.get() + 1);
        PauseClaim {
            depth: Rc::clone(&self.depth),
        }
    }

    /// True when both handles count pauses for the same table.
    pub(crate) fn same_table(&self, other: &RehashPause) -> bool {
        Rc::ptr_eq(&self.depth, &other.depth)
    }
}

/// One outstanding pause, held by a safe cursor.
#[derive(Debug)]
pub(crate) struct PauseClaim {
    depth: Rc<Cell<usize>>,
}

impl Drop for PauseClaim {
    fn drop(&mut self) {
        let d = self.depth.get();
        debug_assert!(d > 0, "rehash pause released more often than claimed");
        self.depth.set(d.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::RehashPause;

    #[test]
    fn claim_and_release() {
        let p = RehashPause::new();
        assert!(!p.is_paused());
        let c = p.claim();
        assert!(p.is_paused());
        drop(c);
        assert!(!p.is_paused());
    }

    #[test]
    fn claims_nest_and_are_shared_by_clones() {
        let p = RehashPause::new();
        let q = p.clone();
        let c1 = p.claim();
        let c2 = q.claim();
        assert_eq!(p.depth(), 2);
        drop(c1);
        assert!(q.is_paused());
        drop(c2);
        assert_eq!(q.depth(), 0);
        assert!(p.same_table(&q));
        assert!(!p.same_table(&RehashPause::new()));
    }
}
