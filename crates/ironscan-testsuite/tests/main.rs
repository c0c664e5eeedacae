#![allow(unused_crate_dependencies)] // false positives because there is both a library and a binary
#![allow(clippy::unwrap_used, reason = "unwrap is fine in tests")]

//! Integration Tests (IT)
//!
//! Integration tests are all contained in this single crate, and organized in modules.
//! This is to prevent `rustc` to re-link the library crates with each of the integration
//! tests (one for each *.rs file / test crate under the `tests/` folder).
//!
//! Every test drives the scripted data source manager of `ironscan-testsuite`, which keeps its
//! state per thread, so tests run in parallel without stepping on each other.

mod manager;
mod registry;
mod source;
