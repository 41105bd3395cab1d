//! Functional core for the MaPro municipal registry.
//!
//! Everything in this crate is pure: domain types and validation, cache key
//! builders, the invalidation table and the async traits that the shell
//! crate implements. No I/O happens here.

pub mod cache;
pub mod registry;
pub mod storage;
