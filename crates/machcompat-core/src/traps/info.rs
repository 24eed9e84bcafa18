//! `task_info`.

use machcompat_protocol::TrapReply;

use super::{Shim, TrapContext};
use crate::error::ShimResult;
use crate::stats;

impl Shim
{
    /// `task_info`: one statistics record of `flavor`.
    ///
    /// `capacity` is the caller's buffer size in info units. It is checked
    /// before the host is asked for anything.
    pub fn task_info(&self, ctx: &TrapContext, flavor: i32, capacity: u32) -> ShimResult<TrapReply>
    {
        let flavor = stats::check_request(flavor, capacity)?;
        let usage = self.host.resource_usage(ctx.target_pid())?;
        Ok(TrapReply::Info(stats::record(flavor, &usage)))
    }
}
