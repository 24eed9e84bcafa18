//! # Trap Message Ids
//!
//! Routine numbers of the MIG `task` subsystem (base 3400) that the shim
//! routes. Only the task-control subset is listed; anything else is answered
//! with [`MIG_BAD_ID`].

use std::fmt;

use crate::wire::WireError;

/// Base message id of the `task` subsystem.
pub const TASK_SUBSYSTEM_BASE: i32 = 3400;

/// MIG return code for an id the server does not implement.
pub const MIG_BAD_ID: i32 = -303;

/// Routines of the task subsystem that reach the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapId
{
    /// `task_terminate`
    Terminate,
    /// `task_threads`
    Threads,
    /// `mach_ports_lookup`
    PortsLookup,
    /// `task_info`
    Info,
    /// `task_suspend`
    Suspend,
    /// `task_resume`
    Resume,
    /// `task_get_special_port`
    GetSpecialPort,
    /// `task_set_special_port`
    SetSpecialPort,
    /// `thread_create`
    ThreadCreate,
    /// `thread_create_running`
    ThreadCreateRunning,
    /// `task_set_exception_ports`
    SetExceptionPorts,
    /// `task_get_exception_ports`
    GetExceptionPorts,
}

impl TrapId
{
    /// Every routed trap, in routine order.
    pub const ALL: [TrapId; 12] = [
        TrapId::Terminate,
        TrapId::Threads,
        TrapId::PortsLookup,
        TrapId::Info,
        TrapId::Suspend,
        TrapId::Resume,
        TrapId::GetSpecialPort,
        TrapId::SetSpecialPort,
        TrapId::ThreadCreate,
        TrapId::ThreadCreateRunning,
        TrapId::SetExceptionPorts,
        TrapId::GetExceptionPorts,
    ];

    /// Message id of the request.
    #[must_use]
    pub fn msg_id(self) -> i32
    {
        TASK_SUBSYSTEM_BASE
            + match self {
                TrapId::Terminate => 1,
                TrapId::Threads => 2,
                TrapId::PortsLookup => 4,
                TrapId::Info => 5,
                TrapId::Suspend => 7,
                TrapId::Resume => 8,
                TrapId::GetSpecialPort => 9,
                TrapId::SetSpecialPort => 10,
                TrapId::ThreadCreate => 11,
                TrapId::ThreadCreateRunning => 12,
                TrapId::SetExceptionPorts => 13,
                TrapId::GetExceptionPorts => 14,
            }
    }

    /// Routine name as it appears in `task.defs`.
    #[must_use]
    pub fn name(self) -> &'static str
    {
        match self {
            TrapId::Terminate => "task_terminate",
            TrapId::Threads => "task_threads",
            TrapId::PortsLookup => "mach_ports_lookup",
            TrapId::Info => "task_info",
            TrapId::Suspend => "task_suspend",
            TrapId::Resume => "task_resume",
            TrapId::GetSpecialPort => "task_get_special_port",
            TrapId::SetSpecialPort => "task_set_special_port",
            TrapId::ThreadCreate => "thread_create",
            TrapId::ThreadCreateRunning => "thread_create_running",
            TrapId::SetExceptionPorts => "task_set_exception_ports",
            TrapId::GetExceptionPorts => "task_get_exception_ports",
        }
    }
}

impl TryFrom<i32> for TrapId
{
    type Error = WireError;

    fn try_from(id: i32) -> Result<Self, Self::Error>
    {
        TrapId::ALL
            .into_iter()
            .find(|trap| trap.msg_id() == id)
            .ok_or(WireError::UnknownMessage(id))
    }
}

impl fmt::Display for TrapId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_msg_ids_roundtrip_through_lookup()
    {
        for trap in TrapId::ALL {
            assert_eq!(TrapId::try_from(trap.msg_id()).unwrap(), trap);
        }
    }

    #[test]
    fn test_known_ids()
    {
        assert_eq!(TrapId::GetSpecialPort.msg_id(), 3409);
        assert_eq!(TrapId::GetExceptionPorts.msg_id(), 3414);
        assert_eq!(TrapId::try_from(3403), Err(WireError::UnknownMessage(3403)));
    }
}
