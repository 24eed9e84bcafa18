//! Exception-port traps.

use machcompat_protocol::{ExceptionMask, ExceptionPortEntry, PortName, TrapReply};
use tracing::{debug, warn};

use super::{Shim, TrapContext};
use crate::error::{ShimError, ShimResult};
use crate::registry::RightFilter;
use crate::types::{ExceptionInfo, PortData};

/// Categories the table stores but the host never raises.
const UNDELIVERED: ExceptionMask = ExceptionMask::ARITHMETIC
    .union(ExceptionMask::EMULATION)
    .union(ExceptionMask::SYSCALL)
    .union(ExceptionMask::MACH_SYSCALL)
    .union(ExceptionMask::RPC_ALERT);

impl Shim
{
    /// `task_get_exception_ports`: every bound handler, in category order.
    ///
    /// The request mask is not used for filtering. Entries carry the mask bit
    /// of their category.
    pub fn task_get_exception_ports(&self, ctx: &TrapContext, mask: u32) -> ShimResult<TrapReply>
    {
        debug!(mask = format_args!("0x{mask:x}"), "returning all bound handlers");
        let state = ctx.target.lock();
        let handlers: Vec<_> = state.exceptions.get().into_iter().take(self.config.max_exception_ports).collect();
        let names = self.send_rights(ctx.caller, handlers.iter().map(|handler| &handler.port))?;
        let entries = handlers
            .iter()
            .zip(names)
            .map(|(handler, port)| ExceptionPortEntry {
                mask: handler.exception.mask().bits(),
                port,
                behavior: handler.info.behavior,
                flavor: handler.info.flavor,
            })
            .collect();
        Ok(TrapReply::ExceptionPorts(entries))
    }

    /// `task_set_exception_ports`: bind the port behind `name` to every
    /// category in `mask`.
    ///
    /// `behavior` and `flavor` are attached to the port itself.
    ///
    /// ## Errors
    ///
    /// `PermissionDenied` unless `name` is a live send right of the caller.
    pub fn task_set_exception_ports(
        &self,
        ctx: &TrapContext,
        mask: u32,
        name: PortName,
        behavior: i32,
        flavor: i32,
    ) -> ShimResult<TrapReply>
    {
        let port = self
            .registry
            .check_right(ctx.caller, name, RightFilter::Send)
            .and_then(|right| right.port)
            .ok_or_else(|| ShimError::PermissionDenied(format!("no send right named 0x{name:x}")))?;

        {
            let mut data = port.data();
            if let PortData::Other(owner) = &*data {
                warn!(port = port.id(), owner, "overwriting port data with exception info");
            }
            *data = PortData::ExceptionInfo(ExceptionInfo { flavor, behavior });
        }

        let mask = ExceptionMask::from_bits_retain(mask);
        if mask.intersects(UNDELIVERED) {
            debug!(mask = format_args!("0x{:x}", mask.bits()), "some requested exceptions are never raised");
        }
        let bound = ctx.target.lock().exceptions.set(mask, &port);
        debug!(bound, port = port.id(), behavior, flavor, "exception ports set");
        Ok(TrapReply::Retval(0))
    }
}
