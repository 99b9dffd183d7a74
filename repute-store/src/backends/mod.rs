//! Backend storage implementations for identities and jobs
//!
//! - `memory`: In-memory storage for tests and transient runs
//! - `test`: Memory storage with failure injection and synchronisation primitives
//! - `file`: JSON documents on disk

pub mod file;
pub mod memory;

pub use file::{FileIdentityStore, FileJobStore};
pub use memory::{MemoryIdentityStore, MemoryJobStore};
pub use test::{TestIdentityStore, TestJobStore};
