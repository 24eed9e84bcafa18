//! `task_for_pid`: the one task-control entry point reached through its own
//! system call rather than a message.

use machcompat_protocol::PortName;
use tracing::{debug, warn};

use super::Shim;
use crate::errno;
use crate::error::{ShimError, ShimResult};
use crate::registry::{RightFilter, RightType};
use crate::task::SpecialPort;
use crate::types::ProcessId;

impl Shim
{
    /// Give `caller` a send right to the kernel port of task `pid`.
    ///
    /// `control` must name some right (of any kind, dead names included) in
    /// the caller's namespace. Access is granted when the caller and target
    /// share a real uid or the caller is privileged.
    ///
    /// ## Errors
    ///
    /// - `PermissionDenied`: bad control name, or not authorized
    /// - `ProcessNotFound`: no such process, or the process is not emulated
    pub fn task_for_pid(&self, caller: ProcessId, control: PortName, pid: ProcessId) -> ShimResult<PortName>
    {
        if self.registry.check_right(caller, control, RightFilter::AllRights).is_none() {
            return Err(ShimError::PermissionDenied(format!("no right named 0x{control:x}")));
        }

        let target_credentials = self.host.credentials(pid)?;
        let target = self.tasks.get(pid).ok_or(ShimError::ProcessNotFound(pid.0))?;

        let caller_credentials = self.host.credentials(caller)?;
        if caller_credentials.ruid != target_credentials.ruid && !self.host.is_privileged(caller)? {
            warn!(%caller, %pid, "task_for_pid denied");
            return Err(ShimError::PermissionDenied(format!(
                "uid {} may not control PID {pid}",
                caller_credentials.ruid
            )));
        }

        let kernel = target
            .lock()
            .special(SpecialPort::Kernel)
            .cloned()
            .ok_or_else(|| ShimError::InvalidArgument(format!("PID {pid} has no kernel port")))?;
        let name = self.registry.get_right(caller, &kernel, RightType::Send)?;
        debug!(%caller, %pid, name, "task_for_pid granted");
        Ok(name)
    }

    /// System-call form of [`Shim::task_for_pid`].
    ///
    /// Writes the new name to `out` and returns 0, or returns a foreign errno
    /// and leaves `out` untouched.
    pub fn sys_task_for_pid(&self, caller: ProcessId, control: PortName, pid: i32, out: &mut PortName) -> i32
    {
        let Ok(pid) = u32::try_from(pid) else {
            return errno::to_foreign(libc::ESRCH);
        };
        match self.task_for_pid(caller, control, ProcessId(pid)) {
            Ok(name) => {
                *out = name;
                0
            }
            Err(err) => errno::to_foreign(err.errno()),
        }
    }
}
