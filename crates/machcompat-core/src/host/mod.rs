//! # Host Kernel
//!
//! Everything the shim needs from the host operating system, behind one trait:
//!
//! - process credentials (for `task_for_pid` authorization)
//! - thread enumeration with scheduling state (for `task_threads` and
//!   `task_suspend`)
//! - resource usage accounting (for `task_info`)
//! - signal delivery (suspend and resume)
//! - process exit (terminate)
//!
//! ## Why a trait?
//!
//! - **Testability**: trap logic runs against an in-memory host in tests
//! - **Portability**: each host gets its own module, selected at compile time
//!
//! - **Linux**: [`linux::LinuxHost`] reads `/proc` and uses `kill(2)`
//!   - See: [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)

#[cfg(target_os = "linux")]
pub mod linux;

use crate::error::ShimResult;
use crate::types::{Credentials, HostThread, ProcessId, ResourceUsage};

/// Signals the shim delivers to whole processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal
{
    /// Stop every thread (`SIGSTOP`)
    Stop,
    /// Continue a stopped process (`SIGCONT`)
    Continue,
}

impl HostSignal
{
    /// Host signal number.
    #[must_use]
    pub fn number(self) -> i32
    {
        match self {
            HostSignal::Stop => libc::SIGSTOP,
            HostSignal::Continue => libc::SIGCONT,
        }
    }
}

/// Host process, thread and signal primitives.
///
/// Implementations must be callable while the shim holds a task lock, so they
/// must not call back into the shim.
pub trait HostKernel: Send + Sync
{
    /// Credentials of `pid`.
    ///
    /// ## Errors
    ///
    /// `ProcessNotFound` if the host has no such process.
    fn credentials(&self, pid: ProcessId) -> ShimResult<Credentials>;

    /// Whether `pid` holds the host's superuser privilege.
    fn is_privileged(&self, pid: ProcessId) -> ShimResult<bool>
    {
        Ok(self.credentials(pid)?.euid == 0)
    }

    /// Snapshot of `pid`'s threads, in the host's enumeration order.
    fn threads(&self, pid: ProcessId) -> ShimResult<Vec<HostThread>>;

    /// Resource usage of `pid`.
    fn resource_usage(&self, pid: ProcessId) -> ShimResult<ResourceUsage>;

    /// Deliver `signal` to every thread of `pid`.
    fn signal(&self, pid: ProcessId, signal: HostSignal) -> ShimResult<()>;

    /// Make `pid` exit with `status`.
    ///
    /// When `pid` is the calling process this does not return.
    fn exit(&self, pid: ProcessId, status: i32) -> ShimResult<()>;
}

/// Default host for the current platform.
#[cfg(target_os = "linux")]
#[must_use]
pub fn native() -> linux::LinuxHost
{
    linux::LinuxHost::new()
}
