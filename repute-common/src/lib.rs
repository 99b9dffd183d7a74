//! Shared types for the repute dispatch scheduler
//!
//! - [`SenderIdentity`]: a (subdomain, IP) pair usable as the origin of an outbound email
//! - [`EmailJob`]: one unit of dispatch work and its [`JobStatus`]
//! - [`logging`]: subscriber initialisation and the `internal!`/`outgoing!` macros

pub mod identity;
pub mod job;
pub mod logging;

pub use identity::{IdentityKey, SenderIdentity};
pub use job::{EmailJob, JobStatus};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
