//! # machcompat-protocol
//!
//! Wire schema for the Mach task-control traps served by machcompat.
//!
//! This crate knows how trap messages look on the wire and nothing about how
//! they are answered:
//!
//! - [`header`]: message header, NDR record, trailer
//! - [`descriptor`]: inline port and out-of-line port-array descriptors
//! - [`ids`]: message ids of the routed traps
//! - [`task`]: per-trap request and reply schemas
//! - [`info`]: `task_info` records
//! - [`exception`]: exception categories and masks
//! - [`wire`]: bounds-checked cursors
//!
//! Replies are always encoded with a declared size equal to the bytes
//! actually written, followed by a trailer that the size does not include.

pub mod descriptor;
pub mod exception;
pub mod header;
pub mod ids;
pub mod info;
pub mod task;
pub mod wire;

pub use exception::{ExceptionMask, ExceptionType};
pub use header::MsgHeader;
pub use ids::TrapId;
pub use info::{TaskInfoFlavor, TaskInfoRecord};
pub use task::{ExceptionPortEntry, Request, TrapReply, TrapRequest};
pub use wire::WireError;

/// Name of a right inside one task's namespace.
pub type PortName = u32;

/// `MACH_PORT_NULL`
pub const MACH_PORT_NULL: PortName = 0;

/// `MACH_PORT_DEAD`
pub const MACH_PORT_DEAD: PortName = !0;
