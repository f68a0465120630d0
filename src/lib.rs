//! rehash-dict: a single-threaded chained hash table that resizes by
//! incremental rehashing, built to serve as the keyspace index of an
//! in-memory data store.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) average insert/find/delete while growing or shrinking the
//!   bucket array without ever stopping for a full rehash.
//! - Layers:
//!   - `Table`: one power-of-two bucket array ("generation") whose slots
//!     hold chain heads; entries are linked by arena keys.
//!   - `Dict<K, V, T>`: two generations (primary and incoming), a rehash
//!     cursor, the entry arena, the type descriptor `T`, and the resize
//!     policy.
//!   - `DictIterator` / `Iter`: cursors that walk both generations.
//!
//! Incremental rehashing
//! - A resize allocates the incoming generation and sets the cursor to 0.
//!   From then on every find/add/delete/sample migrates one non-empty
//!   primary slot before doing its own work; `rehash(n)` and
//!   `rehash_for(budget)` migrate in bulk.
//! - While rehashing, lookups and deletes consult primary then incoming;
//!   new keys always go to incoming. When primary runs empty, incoming is
//!   promoted and the cursor cleared.
//! - Each entry caches its 32-bit hash, so migration never calls into the
//!   descriptor.
//!
//! Storage
//! - Entries live in one `SlotMap`; chains are `next` links between
//!   generational keys. Handles returned to callers are those keys: they
//!   survive migration and never alias a later entry.
//!
//! Resize policy
//! - The first insertion allocates the initial size. A stable table grows
//!   to twice its size when it reaches one entry per bucket, provided the
//!   `ResizeGate` is open or the load factor exceeds the forced ratio.
//!   Shrinking happens only through `resize_to_fit`.
//!
//! Iteration and the rehash pause
//! - A safe cursor pauses every form of rehash work from its first advance
//!   until it is released or dropped, so entries keep their generation and
//!   callers may mutate the table between steps.
//! - A scan-only cursor pauses nothing; the table must not change while it
//!   is open. Debug builds check this on release.
//!
//! Constraints and non-goals
//! - Single-threaded: `Dict` is `!Send`/`!Sync` (descriptor and pause
//!   counter are `Rc`-shared). The resize gate and the hash seed are the
//!   only process-wide state.
//! - No persistence, and hashing is fast rather than collision-resistant.

mod dict;
mod dict_proptest;
pub mod dict_type;
mod error;
pub mod hash;
mod iter;
mod pause;
pub mod policy;
mod stats;
mod table;

// Public surface
pub use dict::{Dict, Handle};
pub use dict_type::{BytesType, CaseInsensitiveType, DictType, IntType, StdType};
pub use error::{DictError, RefuseReason, Result};
pub use iter::{DictIterator, Iter};
pub use policy::{set_resize_enabled, ResizeGate, ResizePolicy};
pub use stats::{DictStats, TableStats, CHAIN_HISTOGRAM_LEN};
