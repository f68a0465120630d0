//! Resize policy: when a table grows, when it may shrink, and the shared
//! gate that lets an outside party hold off ordinary growth.

use crate::error::RefuseReason;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Bucket count of a freshly allocated table.
pub const INITIAL_SIZE: usize = 4;
/// Load factor past which a table grows even while the gate is closed.
pub const FORCE_RESIZE_RATIO: usize = 5;
/// Source slots migrated per batch by the time-boxed rehash.
pub const REHASH_BATCH: usize = 100;

// Largest bucket count `next_power` will hand out.
const MAX_SIZE: usize = 1 << (usize::BITS - 2);

/// Shared on/off switch for ordinary table growth.
///
/// Clones observe the same flag. The process-wide instance is
/// [`ResizeGate::global`]; a snapshotting collaborator closes it while a
/// copy-on-write child is alive so tables stop moving memory around.
#[derive(Clone, Debug)]
pub struct ResizeGate(Arc<AtomicBool>);

impl ResizeGate {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// The process-wide gate every table uses unless configured otherwise.
    pub fn global() -> &'static ResizeGate {
        static GLOBAL: OnceLock<ResizeGate> = OnceLock::new();
        GLOBAL.get_or_init(|| ResizeGate::new(true))
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    pub fn ptr_eq(&self, other: &ResizeGate) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for ResizeGate {
    fn default() -> Self {
        ResizeGate::global().clone()
    }
}

/// Opens or closes the process-wide resize gate.
pub fn set_resize_enabled(enabled: bool) {
    ResizeGate::global().set_enabled(enabled);
}

/// What the grow check decided before an insertion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Growth {
    /// Nothing to do.
    Hold,
    /// The table has no buckets yet; allocate this many.
    Allocate(usize),
    /// Begin rehashing into a table of this size.
    Expand { target: usize, forced: bool },
}

/// Per-table resize configuration.
#[derive(Clone, Debug)]
pub struct ResizePolicy {
    initial_size: usize,
    force_ratio: usize,
    gate: ResizeGate,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizePolicy {
    pub fn new() -> Self {
        Self {
            initial_size: INITIAL_SIZE,
            force_ratio: FORCE_RESIZE_RATIO,
            gate: ResizeGate::default(),
        }
    }

    /// Smallest bucket count the table ever allocates; rounded up to a power of two.
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size.clamp(1, MAX_SIZE).next_power_of_two();
        self
    }

    pub fn with_force_ratio(mut self, ratio: usize) -> Self {
        self.force_ratio = ratio;
        self
    }

    pub fn with_gate(mut self, gate: ResizeGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn force_ratio(&self) -> usize {
        self.force_ratio
    }

    pub fn gate(&self) -> &ResizeGate {
        &self.gate
    }

    /// Smallest power of two that is at least `size` and at least the initial size.
    pub fn next_power(&self, size: usize) -> usize {
        if size >= MAX_SIZE {
            return MAX_SIZE;
        }
        size.max(self.initial_size).next_power_of_two()
    }

    /// Grow check run before every insertion while the table is stable.
    pub(crate) fn growth(&self, size: usize, used: usize) -> Growth {
        if size == 0 {
            return Growth::Allocate(self.initial_size);
        }
        if used < size {
            return Growth::Hold;
        }
        let enabled = self.gate.is_enabled();
        if enabled || used / size > self.force_ratio {
            let target = size.max(used).saturating_mul(2);
            return Growth::Expand {
                target,
                forced: !enabled,
            };
        }
        Growth::Hold
    }

    /// Target size for a shrink-to-fit, or why it is not allowed now.
    pub(crate) fn fit_target(&self, used: usize) -> Result<usize, RefuseReason> {
        if !self.gate.is_enabled() {
            return Err(RefuseReason::ResizeDisabled);
        }
        Ok(used.max(self.initial_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(enabled: bool) -> ResizePolicy {
        ResizePolicy::new().with_gate(ResizeGate::new(enabled))
    }

    #[test]
    fn empty_table_allocates_initial_size() {
        assert_eq!(local(true).growth(0, 0), Growth::Allocate(INITIAL_SIZE));
        assert_eq!(local(false).growth(0, 0), Growth::Allocate(INITIAL_SIZE));
        let p = local(true).with_initial_size(10);
        assert_eq!(p.growth(0, 0), Growth::Allocate(16));
    }

    #[test]
    fn grows_at_one_to_one_when_enabled() {
        let p = local(true);
        assert_eq!(p.growth(4, 3), Growth::Hold);
        assert_eq!(
            p.growth(4, 4),
            Growth::Expand {
                target: 8,
                forced: false
            }
        );
    }

    #[test]
    fn closed_gate_only_forces_past_ratio() {
        let p = local(false);
        assert_eq!(p.growth(4, 4), Growth::Hold);
        // 24 / 4 == 6 > 5
        assert_eq!(p.growth(4, 20), Growth::Hold);
        assert_eq!(
            p.growth(4, 24),
            Growth::Expand {
                target: 48,
                forced: true
            }
        );
    }

    #[test]
    fn gate_clones_share_state() {
        let gate = ResizeGate::new(true);
        let p = local(true).with_gate(gate.clone());
        gate.set_enabled(false);
        assert!(!p.gate().is_enabled());
        assert!(p.gate().ptr_eq(&gate));
        assert_eq!(p.fit_target(3), Err(RefuseReason::ResizeDisabled));
        gate.set_enabled(true);
        assert_eq!(p.fit_target(3), Ok(INITIAL_SIZE));
        assert_eq!(p.fit_target(9), Ok(9));
    }

    #[test]
    fn next_power_rounds_up() {
        let p = local(true);
        assert_eq!(p.next_power(0), 4);
        assert_eq!(p.next_power(4), 4);
        assert_eq!(p.next_power(5), 8);
        assert_eq!(p.next_power(1000), 1024);
        assert_eq!(p.next_power(usize::MAX), MAX_SIZE);
    }
}
