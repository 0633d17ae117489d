//! In-memory buffer abstraction consumed by the codec.
//!
//! Reads go through [`PofInput`]; writes append to a `bytes::BytesMut`.

pub mod input;

pub use input::PofInput;
