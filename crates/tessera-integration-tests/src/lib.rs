//! Integration test crate for the Tessera ledger.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the ledger through complete membership and settlement
//! lifecycles across the workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tessera-integration-tests
//! ```
