//! Run control: `task_suspend`, `task_resume`, `task_terminate`.

use machcompat_protocol::TrapReply;
use tracing::{debug, warn};

use super::{Shim, TrapContext};
use crate::errno;
use crate::error::{ShimError, ShimResult};
use crate::host::HostSignal;

impl Shim
{
    /// `task_suspend`: stop the whole task.
    ///
    /// Refuses, without touching the counter or signalling, when any thread
    /// is outside the normal run states. Otherwise the counter goes up by one
    /// and the task is sent a stop signal. A failed signal rolls the counter
    /// back.
    pub fn task_suspend(&self, ctx: &TrapContext) -> ShimResult<TrapReply>
    {
        let pid = ctx.target_pid();
        let mut state = ctx.target.lock();

        let threads = self.host.threads(pid)?;
        if let Some(thread) = threads.iter().find(|thread| !thread.state.is_normal()) {
            debug!(%pid, tid = thread.id.raw(), state = ?thread.state, "thread cannot be suspended");
            return Err(ShimError::ThreadsNotSuspendable { pid: pid.0 });
        }

        state.suspend_count = state.suspend_count.saturating_add(1);
        if let Err(err) = self.host.signal(pid, HostSignal::Stop) {
            state.suspend_count = state.suspend_count.saturating_sub(1);
            return Err(err);
        }
        debug!(%pid, suspend_count = state.suspend_count, "task suspended");
        Ok(TrapReply::Retval(0))
    }

    /// `task_resume`: decrement the counter (no lower bound) and continue the
    /// task unconditionally.
    ///
    /// Always succeeds. A failed continue signal is logged and otherwise
    /// ignored.
    pub fn task_resume(&self, ctx: &TrapContext) -> ShimResult<TrapReply>
    {
        let pid = ctx.target_pid();
        let mut state = ctx.target.lock();

        state.suspend_count = state.suspend_count.saturating_sub(1);
        if let Err(err) = self.host.signal(pid, HostSignal::Continue) {
            warn!(%pid, error = %err, "continue signal failed");
        }
        if state.suspend_count < 0 {
            warn!(%pid, suspend_count = state.suspend_count, "resumed a task that was not suspended");
        }
        debug!(%pid, suspend_count = state.suspend_count, "task resumed");
        Ok(TrapReply::Retval(0))
    }

    /// `task_terminate`: exit the task's process with status zero.
    ///
    /// The reply's return code is the foreign translation of errno 0. A
    /// terminated foreign task is unregistered.
    pub fn task_terminate(&self, ctx: &TrapContext) -> ShimResult<TrapReply>
    {
        let pid = ctx.target_pid();
        self.host.exit(pid, 0)?;
        self.unregister_task(pid);
        Ok(TrapReply::Retval(errno::to_foreign(0)))
    }
}
