//! Task routines this kernel does not implement.
//!
//! Each one fails with `KERN_NOT_SUPPORTED` and touches no task state.

use machcompat_protocol::TrapReply;

use super::{Shim, TrapContext};
use crate::error::{ShimError, ShimResult};

/// Every unsupported routine, by name.
pub const UNSUPPORTED_ROUTINES: [&str; 14] = [
    "task_get_mach_voucher",
    "task_set_mach_voucher",
    "task_swap_mach_voucher",
    "task_get_state",
    "task_set_state",
    "task_policy_get",
    "task_policy_set",
    "task_purgable_info",
    "task_suspend2",
    "task_resume2",
    "task_set_phys_footprint_limit",
    "task_zone_info",
    "thread_create_from_user",
    "thread_create_running_from_user",
];

macro_rules! unsupported {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        impl Shim
        {
            $(
                $(#[$meta])*
                pub fn $name(&self, _ctx: &TrapContext) -> ShimResult<TrapReply>
                {
                    tracing::debug!(routine = stringify!($name), "unsupported routine called");
                    Err(ShimError::Unsupported(stringify!($name)))
                }
            )+
        }
    };
}

unsupported! {
    /// `task_get_mach_voucher`
    task_get_mach_voucher,
    /// `task_set_mach_voucher`
    task_set_mach_voucher,
    /// `task_swap_mach_voucher`
    task_swap_mach_voucher,
    /// `task_get_state`
    task_get_state,
    /// `task_set_state`
    task_set_state,
    /// `task_policy_get`
    task_policy_get,
    /// `task_policy_set`
    task_policy_set,
    /// `task_purgable_info`
    task_purgable_info,
    /// `task_suspend2`
    task_suspend2,
    /// `task_resume2`
    task_resume2,
    /// `task_set_phys_footprint_limit`
    task_set_phys_footprint_limit,
    /// `task_zone_info`
    task_zone_info,
    /// `thread_create`: creating threads in another task
    thread_create_from_user,
    /// `thread_create_running`: creating threads in another task
    thread_create_running_from_user,
}

impl Shim
{
    /// Call an unsupported routine by name.
    ///
    /// Unknown names are treated like every other unsupported routine.
    pub fn unsupported_routine(&self, ctx: &TrapContext, routine: &str) -> ShimResult<TrapReply>
    {
        match routine {
            "task_get_mach_voucher" => self.task_get_mach_voucher(ctx),
            "task_set_mach_voucher" => self.task_set_mach_voucher(ctx),
            "task_swap_mach_voucher" => self.task_swap_mach_voucher(ctx),
            "task_get_state" => self.task_get_state(ctx),
            "task_set_state" => self.task_set_state(ctx),
            "task_policy_get" => self.task_policy_get(ctx),
            "task_policy_set" => self.task_policy_set(ctx),
            "task_purgable_info" => self.task_purgable_info(ctx),
            "task_suspend2" => self.task_suspend2(ctx),
            "task_resume2" => self.task_resume2(ctx),
            "task_set_phys_footprint_limit" => self.task_set_phys_footprint_limit(ctx),
            "task_zone_info" => self.task_zone_info(ctx),
            "thread_create_from_user" => self.thread_create_from_user(ctx),
            "thread_create_running_from_user" => self.thread_create_running_from_user(ctx),
            _ => Err(ShimError::Unsupported("unknown routine")),
        }
    }
}
