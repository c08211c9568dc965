//! Integration tests for the usmfum workspace.
//!
//! This crate intentionally has no library code; the scenarios live under
//! `tests/`.
