//! Attribute storage for the in-memory DOM.
//!
//! Every element carries its own attribute map, so the map's hasher state is
//! paid once per element. Attribute names come from the application, not from
//! untrusted input, which leaves no flooding attack to defend against: a
//! zero-sized builder with one fixed foldhash seed keeps each map as small as
//! the entries it holds, and hashes a name identically in every element.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};
use indexmap::IndexMap;

const SEED: u64 = 0x2d35_8dcc_aa6c_78a5;

/// Attribute name to value, in the order the attributes were first set.
pub(crate) type AttributeMap = IndexMap<String, String, AttributeHasher>;

/// Create an empty [`AttributeMap`]
pub(crate) fn attribute_map() -> AttributeMap {
    IndexMap::with_hasher(AttributeHasher)
}

/// Zero-sized `BuildHasher` for attribute names.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct AttributeHasher;

impl BuildHasher for AttributeHasher {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(SEED).build_hasher()
    }
}
