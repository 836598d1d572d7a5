//! Deterministic, pure logic shared by the cycle controller.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod fence;
pub mod protocol;
pub mod state;
pub mod types;
