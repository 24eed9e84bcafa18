//! Common module for library exports

pub use machcompat_protocol::{PortName, TrapReply, MACH_PORT_DEAD, MACH_PORT_NULL};

pub use crate::config::ShimConfig;
pub use crate::error::{ShimError, ShimResult};
#[cfg(target_os = "linux")]
pub use crate::host::linux::LinuxHost;
pub use crate::host::{HostKernel, HostSignal};
pub use crate::ool::{LocalOolArena, OolTransfer};
pub use crate::registry::{LocalRegistry, RightFilter, RightRegistry, RightType};
pub use crate::task::SpecialPort;
pub use crate::traps::{Shim, TrapContext};
pub use crate::types::{Port, PortKind, PortRef, ProcessId, ThreadId};
