//! POF wire format: type tags, packed integers, string payloads, type
//! coercions and value skipping.

pub mod catalog;
pub mod marker;
pub mod packed;
pub mod skip;
pub mod utf;
