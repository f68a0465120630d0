//! Error values returned by table operations.

use thiserror::Error;

/// Why a resize or rehash-control request was turned down.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum RefuseReason {
    #[error("an incremental rehash is already in progress")]
    Rehashing,
    #[error("resizing is disabled by the resize gate")]
    ResizeDisabled,
    #[error("target size {target} cannot hold {used} entries")]
    BelowUsed { target: usize, used: usize },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum DictError {
    /// `add` on a key that is already present.
    #[error("key already exists")]
    AlreadyExists,
    #[error("key not found")]
    NotFound,
    /// The table has no bucket array at all.
    #[error("table is empty")]
    Empty,
    #[error("resize refused: {0}")]
    Refused(RefuseReason),
    #[error("failed to allocate a bucket array of {slots} slots")]
    AllocationFailure { slots: usize },
}

impl From<RefuseReason> for DictError {
    fn from(reason: RefuseReason) -> Self {
        DictError::Refused(reason)
    }
}

pub type Result<T> = core::result::Result<T, DictError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_cause() {
        let e = DictError::from(RefuseReason::BelowUsed { target: 4, used: 9 });
        assert_eq!(e.to_string(), "resize refused: target size 4 cannot hold 9 entries");
        assert_eq!(DictError::Empty.to_string(), "table is empty");
        assert_eq!(
            DictError::AllocationFailure { slots: 8 }.to_string(),
            "failed to allocate a bucket array of 8 slots"
        );
    }
}
