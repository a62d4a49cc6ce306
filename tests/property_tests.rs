//! Property-based tests for the metrics core.
//!
//! Run with: cargo test --test property_tests

mod property;
