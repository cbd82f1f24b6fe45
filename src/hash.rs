//! Hasher for the crate's internal maps.
//!
//! Store keys and subscriber ids are produced by this crate, never by an
//! attacker, so HashDoS resistance is irrelevant and a fixed-seed foldhash is
//! used everywhere an `IndexMap`/`HashSet` is keyed.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

/// Zero-sized, deterministic `BuildHasher` backed by foldhash.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x9e37_79b9_7f4a_7c15).build_hasher()
    }
}
