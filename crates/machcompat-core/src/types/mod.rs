//! Platform-agnostic types shared across the shim.

pub mod port;
pub mod process;

pub use port::{ExceptionInfo, Port, PortData, PortHandle, PortKind, PortRef};
pub use process::{Credentials, HostThread, ProcessId, ResourceUsage, ThreadId, ThreadRunState, TimeVal};
