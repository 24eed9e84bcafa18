//! # Error Types
//!
//! Error handling for trap dispatch.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages. Every variant knows which host errno it stands for;
//! the dispatcher translates that errno into the foreign error space before
//! stamping it into the reply (see [`crate::errno`]).

use machcompat_protocol::ids::MIG_BAD_ID;
use machcompat_protocol::WireError;
use thiserror::Error;

use crate::errno;

/// `KERN_NOT_SUPPORTED`: returned by routines this kernel does not implement.
pub const KERN_NOT_SUPPORTED: i32 = 46;

/// Main error type for trap operations
///
/// ## Error Categories
///
/// 1. **Not supported**: NotSupported, Unsupported
/// 2. **Invalid argument**: InvalidArgument, DeadName, NullPort, Wire
/// 3. **Permission errors**: PermissionDenied
/// 4. **Resource errors**: NoBuffers
/// 5. **Lookup errors**: ProcessNotFound, UnknownTask
/// 6. **Host errors**: Host, Io
#[derive(Error, Debug)]
pub enum ShimError
{
    /// The port selector or flavor is recognised but not implemented
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// The routine is a stub in this kernel
    ///
    /// Voucher, thread-state, policy, purgeable-memory, two-phase suspend,
    /// footprint-limit, zone-info and remote thread-creation routines all
    /// land here without touching any task state.
    #[error("{0} is not supported in this kernel")]
    Unsupported(&'static str),

    /// Malformed selector or unknown flavor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A dead name was supplied where a live right is required
    #[error("Port name 0x{0:x} is a dead name")]
    DeadName(u32),

    /// The caller supplied `MACH_PORT_NULL`
    #[error("Null port name")]
    NullPort,

    /// The named right does not exist or has the wrong type
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The caller's declared output capacity is smaller than the record
    #[error("Insufficient buffer: record needs {needed} units, caller offered {offered}")]
    NoBuffers
    {
        /// Units the record occupies
        needed: u32,
        /// Units the caller declared
        offered: u32,
    },

    /// The host has no process with this PID
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// The process exists but is not an emulated task
    #[error("PID {0} is not an emulated task")]
    UnknownTask(u32),

    /// A thread of the task is outside the states from which it may be stopped
    #[error("Task {pid} has threads that cannot be suspended")]
    ThreadsNotSuspendable
    {
        /// Target task
        pid: u32,
    },

    /// A host primitive (signal delivery, exit, out-of-line copy) failed
    #[error("Host operation {operation} failed: errno {errno}")]
    Host
    {
        /// What the shim was doing
        operation: &'static str,
        /// Host errno reported by the primitive
        errno: i32,
    },

    /// Request decoding or reply encoding failed
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// I/O error while reading host process information
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShimError
{
    /// Host errno this error stands for.
    ///
    /// `NullPort` and `ThreadsNotSuspendable` map to `0`: the trap fails and
    /// mutates nothing, but the reply carries the translation of errno zero.
    #[must_use]
    pub fn errno(&self) -> i32
    {
        match self {
            ShimError::NotSupported(_) | ShimError::Unsupported(_) => libc::ENOTSUP,
            ShimError::InvalidArgument(_) | ShimError::DeadName(_) | ShimError::Wire(_) => libc::EINVAL,
            ShimError::NullPort | ShimError::ThreadsNotSuspendable { .. } => 0,
            ShimError::PermissionDenied(_) => libc::EPERM,
            ShimError::NoBuffers { .. } => libc::ENOBUFS,
            ShimError::ProcessNotFound(_) | ShimError::UnknownTask(_) => libc::ESRCH,
            ShimError::Host { errno, .. } => *errno,
            ShimError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Value stamped into the reply's return-code slot.
    #[must_use]
    pub fn retval(&self) -> i32
    {
        match self {
            ShimError::Unsupported(_) => KERN_NOT_SUPPORTED,
            ShimError::Wire(WireError::UnknownMessage(_)) => MIG_BAD_ID,
            _ => errno::to_foreign(self.errno()),
        }
    }

    /// Build a `Host` error from the calling thread's last OS error.
    #[must_use]
    pub fn last_os(operation: &'static str) -> Self
    {
        ShimError::Host {
            operation,
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Convenience type alias for `Result<T, ShimError>`
///
/// ```rust
/// use machcompat_core::error::ShimResult;
/// fn foo() -> ShimResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type ShimResult<T> = std::result::Result<T, ShimError>;
