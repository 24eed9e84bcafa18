//! Dispatch limits.

/// Most exception handlers a `task_get_exception_ports` reply carries.
pub const DEFAULT_MAX_EXCEPTION_PORTS: usize = 32;

/// `init_port_set_count` reported by `mach_ports_lookup`.
///
/// Smaller than the seven-slot array the trap copies out; callers built
/// against the real kernel read only the first three entries.
pub const DEFAULT_LOOKUP_REPORTED_COUNT: u32 = 3;

/// Tunables for a [`crate::Shim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimConfig
{
    /// Cap on exception handlers returned per reply
    pub max_exception_ports: usize,
    /// Count reported (and stamped into the descriptor) by `mach_ports_lookup`
    pub lookup_reported_count: u32,
}

impl Default for ShimConfig
{
    fn default() -> Self
    {
        Self {
            max_exception_ports: DEFAULT_MAX_EXCEPTION_PORTS,
            lookup_reported_count: DEFAULT_LOOKUP_REPORTED_COUNT,
        }
    }
}
