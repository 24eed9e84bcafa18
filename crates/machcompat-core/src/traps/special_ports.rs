//! Special-port traps: `task_get_special_port`, `task_set_special_port`,
//! `mach_ports_lookup`.

use machcompat_protocol::descriptor::OolPortsDescriptor;
use machcompat_protocol::{PortName, TrapReply, MACH_PORT_DEAD, MACH_PORT_NULL};
use tracing::{debug, warn};

use super::{Shim, TrapContext};
use crate::error::{ShimError, ShimResult};
use crate::ool::encode_port_names;
use crate::registry::{RightFilter, RightType};
use crate::task::{SpecialPort, TASK_PORT_SLOTS};

impl Shim
{
    /// `task_get_special_port`: a send right to one of the task's well-known
    /// ports.
    ///
    /// ## Errors
    ///
    /// `NotSupported` for the ledger selectors and unknown selectors.
    pub fn task_get_special_port(&self, ctx: &TrapContext, which: i32) -> ShimResult<TrapReply>
    {
        let selector = SpecialPort::from_raw(which);
        let state = ctx.target.lock();
        let Some(port) = selector.and_then(|selector| state.special(selector)) else {
            warn!(which, "special port not implemented");
            return Err(ShimError::NotSupported(format!("special port {which}")));
        };
        let name = self.registry.get_right(ctx.caller, port, RightType::Send)?;
        debug!(which, name, "special port returned");
        Ok(TrapReply::SpecialPort(name))
    }

    /// `task_set_special_port`: bind the port behind `name` to a well-known
    /// slot.
    ///
    /// ## Errors
    ///
    /// - `NullPort`: `name` is `MACH_PORT_NULL`
    /// - `PermissionDenied`: `name` is not a right in the caller's namespace
    /// - `DeadName`: `name` is a dead name
    /// - `NotSupported`: the selector is a ledger or unknown; nothing changes
    pub fn task_set_special_port(&self, ctx: &TrapContext, which: i32, name: PortName) -> ShimResult<TrapReply>
    {
        if name == MACH_PORT_NULL {
            return Err(ShimError::NullPort);
        }
        let right = self
            .registry
            .check_right(ctx.caller, name, RightFilter::AllRights)
            .ok_or_else(|| ShimError::PermissionDenied(format!("no right named 0x{name:x}")))?;
        if right.kind == RightType::DeadName {
            return Err(ShimError::DeadName(name));
        }
        let port = right.port.ok_or(ShimError::DeadName(name))?;

        let selector = SpecialPort::from_raw(which);
        let replaced = selector.is_some_and(|selector| ctx.target.lock().replace_special(selector, &port));
        if !replaced {
            warn!(which, "cannot set special port");
            return Err(ShimError::NotSupported(format!("special port {which}")));
        }
        debug!(which, port = port.id(), "special port set");
        Ok(TrapReply::Retval(0))
    }

    /// `mach_ports_lookup`: the well-known ports as a seven-slot out-of-line
    /// array.
    ///
    /// Slots 1, 2 and 4 carry send rights to the kernel, host and bootstrap
    /// ports; the others hold `MACH_PORT_DEAD`. The reported count is
    /// [`crate::ShimConfig::lookup_reported_count`], not the slot count. A
    /// failed copy-out takes the minted rights back.
    pub fn mach_ports_lookup(&self, ctx: &TrapContext) -> ShimResult<TrapReply>
    {
        let mut names = [MACH_PORT_DEAD; TASK_PORT_SLOTS];
        {
            let state = ctx.target.lock();
            for selector in SpecialPort::BOUND {
                if let Some(port) = state.special(selector) {
                    match self.registry.get_right(ctx.caller, port, RightType::Send) {
                        Ok(name) => names[selector.raw() as usize] = name,
                        Err(err) => {
                            self.release_rights(ctx.caller, &names);
                            return Err(err);
                        }
                    }
                }
            }
        }

        let address = match self.ool.copyout(ctx.caller, encode_port_names(&names)) {
            Ok(address) => address,
            Err(err) => {
                self.release_rights(ctx.caller, &names);
                return Err(err);
            }
        };
        let count = self.config.lookup_reported_count;
        Ok(TrapReply::PortsLookup {
            ports: OolPortsDescriptor { address, count },
            count,
        })
    }
}
