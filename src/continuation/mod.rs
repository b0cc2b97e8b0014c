//! Cross-partition continuation tokens
//!
//! A cross-partition continuation is an ordered list of composite
//! tokens, one per key range still to visit. Together the ranges cover
//! the unvisited key space plus the range in progress, with no gaps and
//! no duplicates.

mod composite;

pub use composite::CompositeContinuationToken;
