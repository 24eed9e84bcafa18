//! `task_threads`.

use machcompat_protocol::descriptor::OolPortsDescriptor;
use machcompat_protocol::TrapReply;
use tracing::debug;

use super::{Shim, TrapContext};
use crate::error::{ShimError, ShimResult};
use crate::ool::encode_port_names;

impl Shim
{
    /// `task_threads`: one send right per thread, copied out of line.
    ///
    /// The host thread list is read and the thread ports resolved under the
    /// task lock, so the count in the reply always matches the array length.
    /// The copy-out happens after the lock is released; if it fails the
    /// minted rights are taken back.
    pub fn task_threads(&self, ctx: &TrapContext) -> ShimResult<TrapReply>
    {
        let pid = ctx.target_pid();
        let names = {
            let mut state = ctx.target.lock();
            let threads = self.host.threads(pid)?;
            state.prune_thread_ports(&threads);
            let ports: Vec<_> = threads.iter().map(|thread| state.thread_port(pid, thread.id)).collect();
            self.send_rights(ctx.caller, &ports)?
        };

        let Ok(count) = u32::try_from(names.len()) else {
            self.release_rights(ctx.caller, &names);
            return Err(ShimError::InvalidArgument(format!("{} threads do not fit a reply", names.len())));
        };
        let address = match self.ool.copyout(ctx.caller, encode_port_names(&names)) {
            Ok(address) => address,
            Err(err) => {
                self.release_rights(ctx.caller, &names);
                return Err(err);
            }
        };
        debug!(%pid, count, "threads enumerated");
        Ok(TrapReply::Threads {
            threads: OolPortsDescriptor { address, count },
            count,
        })
    }
}
