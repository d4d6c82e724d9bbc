//! Shared helpers for slowfs integration tests.

#![allow(dead_code, unused_imports)]

#[macro_use]
pub mod harness;

pub use harness::{fuse_available, TestMount};
