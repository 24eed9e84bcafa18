//! Process, thread, and credential types.

use std::fmt;

/// Process identifier (PID)
///
/// Emulated tasks correspond one-to-one with host processes, so the PID also
/// names the task and the capability namespace that belongs to it.
///
/// ## Why wrap it in a struct?
///
/// Using a newtype pattern (`struct ProcessId(u32)`) instead of a raw `u32`
/// provides:
/// - **Type safety**: Prevents accidentally passing a port name where a PID is expected
/// - **Self-documenting code**: Makes it clear what the value represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Host thread identifier (the kernel TID on Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    ///
    /// ```rust
    /// use machcompat_core::types::ThreadId;
    ///
    /// let thread = ThreadId::from(12345);
    /// assert_eq!(thread.raw(), 12345);
    /// ```
    #[must_use]
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

/// Scheduling state of a host thread.
///
/// The first five states form the "normal" set a task may be suspended from.
/// Anything else (a zombie thread, a thread being torn down, a state the host
/// reports that we do not recognise) makes `task_suspend` refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRunState
{
    /// Created but never run
    Inactive,
    /// Blocked: sleeping, waiting on I/O, or already stopped
    Inhibited,
    /// Able to run but not queued
    CanRun,
    /// Queued on a run queue
    RunQueue,
    /// Executing on a CPU
    Running,
    /// Exited but not yet reaped
    Zombie,
    /// State letter the host reported that has no equivalent
    Unknown(char),
}

impl ThreadRunState
{
    /// Whether the state belongs to the set a task may be suspended from.
    #[must_use]
    pub fn is_normal(self) -> bool
    {
        matches!(
            self,
            ThreadRunState::Inactive
                | ThreadRunState::Inhibited
                | ThreadRunState::CanRun
                | ThreadRunState::RunQueue
                | ThreadRunState::Running
        )
    }
}

/// A thread as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostThread
{
    /// Host thread id
    pub id: ThreadId,
    /// Scheduling state at snapshot time
    pub state: ThreadRunState,
}

/// Identity the host associates with a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials
{
    /// Real user id
    pub ruid: u32,
    /// Effective user id
    pub euid: u32,
}

/// Seconds plus microseconds, as `struct timeval` carries CPU time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeVal
{
    /// Whole seconds
    pub sec: i64,
    /// Microseconds within the second
    pub usec: i64,
}

/// Host resource-usage accounting for one process (`struct rusage` subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceUsage
{
    /// User CPU time
    pub utime: TimeVal,
    /// System CPU time
    pub stime: TimeVal,
    /// Maximum resident set size
    pub maxrss: i64,
    /// Integral shared text size
    pub ixrss: i64,
    /// Minor page faults
    pub minflt: i64,
    /// Major page faults
    pub majflt: i64,
    /// Messages sent
    pub msgsnd: i64,
    /// Messages received
    pub msgrcv: i64,
    /// Voluntary context switches
    pub nvcsw: i64,
    /// Involuntary context switches
    pub nivcsw: i64,
}
