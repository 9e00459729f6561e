//! Shared functionality
//!
//! This crate supplies the byte and character plumbing shared by the weft
//! parser crates: byte sources, the BOM-aware decoder and the error types.

pub mod byte_stream;
pub mod errors;
