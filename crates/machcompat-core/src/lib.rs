//! # machcompat-core
//!
//! Mach task-control trap emulation on top of host process, thread and signal
//! primitives.
//!
//! This crate provides:
//! - The capability model: kernel ports with owned references, the right
//!   registry interface and an in-process registry
//! - Per-task emulation state: special ports, suspend counter, exception
//!   handler table, thread ports
//! - The task statistics adapter
//! - The trap dispatch layer ([`Shim`]) and message-level entry point
//! - A Linux host backend
//!
//! ## Platform Support
//!
//! - **Linux**: procfs for thread and resource information, `kill(2)` for
//!   run control
//! - **Other hosts**: bring your own [`host::HostKernel`]
//!
//! ## Why unsafe code is needed
//!
//! The Linux backend calls `kill`, `getrusage` and `sysconf` through libc.
//! These are wrapped in safe functions; no unsafe code leaks into the trap
//! layer.

#![allow(unsafe_code)] // Required for libc host calls

pub mod config;
pub mod errno;
pub mod error;
pub mod exception;
pub mod host;
pub mod ool;
pub mod prelude;
pub mod registry;
pub mod stats;
pub mod task;
pub mod traps;
pub mod types;

pub use config::ShimConfig;
pub use error::{ShimError, ShimResult};
pub use host::{HostKernel, HostSignal};
pub use ool::{LocalOolArena, OolTransfer};
pub use registry::{LocalRegistry, RightRegistry};
pub use traps::{Shim, TrapContext};
pub use types::{ProcessId, ThreadId};
