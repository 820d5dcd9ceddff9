//! Reusable workloads.
//!
//! Contains node programs that can be used both in `#[test]` integration
//! tests and in standalone binary targets.

pub mod broadcast;
