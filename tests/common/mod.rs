#![allow(dead_code)]

//! Common test utilities and helpers
//!
//! - Scripted in-process remote backend
//! - Engine harness wired to an in-memory database

pub mod fake_remote;
pub mod harness;

// Re-export commonly used utilities
pub use fake_remote::*;
pub use harness::*;
