//! Compact collections for dense-id domains
//!
//! Every analysis domain (types, methods, variables, objects, pointers,
//! contexts) is assigned dense integer ids at first encounter; the set
//! representations here exploit that contiguity for word-parallel
//! operations and cheap delta extraction.

pub mod bitset;
pub mod hybrid_set;
pub mod indexer;

pub use bitset::BitSet;
pub use hybrid_set::PointsToSet;
pub use indexer::Indexer;
