//! Supervision primitives for external processes
//!
//! Spawning with append-only logs, the graceful-then-forced stop protocol,
//! an ordered registry of owned processes, and the loopback port prober used
//! to health-check relays.

pub mod binary;
pub mod error;
pub mod managed;
pub mod probe;
pub mod registry;

pub use binary::require_binary;
pub use error::ProcessError;
pub use managed::{ManagedProcess, ProcessSpec, StopOutcome};
pub use probe::{wait_until_listening, wait_until_listening_with, ProbeOptions};
pub use registry::ProcessRegistry;
