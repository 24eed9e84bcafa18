//! # Task Info Records
//!
//! Fixed-layout records returned by `task_info`. Sizes are expressed in
//! `natural_t` units (4 bytes), which is how callers declare their output
//! capacity.

use static_assertions::const_assert_eq;

use crate::wire::{WireError, WireWriter};

/// Size of one info unit (`natural_t`).
pub const INFO_UNIT_SIZE: usize = 4;

/// Largest record the reply can carry, in units.
pub const TASK_INFO_MAX: u32 = 32;

/// `TASK_EVENTS_INFO`
pub const TASK_EVENTS_INFO: i32 = 2;

/// `TASK_THREAD_TIMES_INFO`
pub const TASK_THREAD_TIMES_INFO: i32 = 3;

/// `TASK_BASIC_INFO` (32-bit layout)
pub const TASK_BASIC_INFO: i32 = 4;

/// Info flavors the shim answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskInfoFlavor
{
    /// Suspend count, memory sizes, CPU times, policy.
    Basic,
    /// Accumulated user and system time.
    ThreadTimes,
    /// Fault, page-in and message counters.
    Events,
}

impl TaskInfoFlavor
{
    /// Parse a raw flavor; `None` for flavors the shim does not answer.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self>
    {
        match raw {
            TASK_BASIC_INFO => Some(Self::Basic),
            TASK_THREAD_TIMES_INFO => Some(Self::ThreadTimes),
            TASK_EVENTS_INFO => Some(Self::Events),
            _ => None,
        }
    }

    /// Raw flavor number.
    #[must_use]
    pub fn raw(self) -> i32
    {
        match self {
            Self::Basic => TASK_BASIC_INFO,
            Self::ThreadTimes => TASK_THREAD_TIMES_INFO,
            Self::Events => TASK_EVENTS_INFO,
        }
    }

    /// Record size in info units.
    #[must_use]
    pub fn count(self) -> u32
    {
        match self {
            Self::Basic => TaskBasicInfo::COUNT,
            Self::ThreadTimes => TaskThreadTimesInfo::COUNT,
            Self::Events => TaskEventsInfo::COUNT,
        }
    }
}

/// `time_value_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeValue
{
    /// Whole seconds.
    pub seconds: i32,
    /// Microseconds within the second.
    pub microseconds: i32,
}

impl TimeValue
{
    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError>
    {
        writer.i32(self.seconds)?;
        writer.i32(self.microseconds)
    }
}

/// `task_basic_info` (32-bit layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskBasicInfo
{
    /// Reported suspend count.
    pub suspend_count: i32,
    /// Virtual memory size.
    pub virtual_size: u32,
    /// Resident memory size.
    pub resident_size: u32,
    /// Total user time of terminated threads.
    pub user_time: TimeValue,
    /// Total system time of terminated threads.
    pub system_time: TimeValue,
    /// Default scheduling policy.
    pub policy: i32,
}

impl TaskBasicInfo
{
    /// Size in info units.
    pub const COUNT: u32 = 10;
}

/// `task_thread_times_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskThreadTimesInfo
{
    /// Total user run time of live threads.
    pub user_time: TimeValue,
    /// Total system run time of live threads.
    pub system_time: TimeValue,
}

impl TaskThreadTimesInfo
{
    /// Size in info units.
    pub const COUNT: u32 = 4;
}

/// `task_events_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskEventsInfo
{
    /// Number of page faults.
    pub faults: i32,
    /// Number of actual page-ins.
    pub pageins: i32,
    /// Number of copy-on-write faults.
    pub cow_faults: i32,
    /// Number of messages sent.
    pub messages_sent: i32,
    /// Number of messages received.
    pub messages_received: i32,
    /// Number of Mach system calls.
    pub syscalls_mach: i32,
    /// Number of Unix system calls.
    pub syscalls_unix: i32,
    /// Number of context switches.
    pub csw: i32,
}

impl TaskEventsInfo
{
    /// Size in info units.
    pub const COUNT: u32 = 8;
}

const_assert_eq!(TaskBasicInfo::COUNT as usize * INFO_UNIT_SIZE, 40);
const_assert_eq!(TaskEventsInfo::COUNT as usize * INFO_UNIT_SIZE, 32);

/// One of the records `task_info` can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskInfoRecord
{
    /// `TASK_BASIC_INFO`
    Basic(TaskBasicInfo),
    /// `TASK_THREAD_TIMES_INFO`
    ThreadTimes(TaskThreadTimesInfo),
    /// `TASK_EVENTS_INFO`
    Events(TaskEventsInfo),
}

impl TaskInfoRecord
{
    /// Flavor of the record.
    #[must_use]
    pub fn flavor(&self) -> TaskInfoFlavor
    {
        match self {
            Self::Basic(_) => TaskInfoFlavor::Basic,
            Self::ThreadTimes(_) => TaskInfoFlavor::ThreadTimes,
            Self::Events(_) => TaskInfoFlavor::Events,
        }
    }

    /// Size of the record in info units.
    #[must_use]
    pub fn count(&self) -> u32
    {
        self.flavor().count()
    }

    /// Size of the record in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize
    {
        self.count() as usize * INFO_UNIT_SIZE
    }

    /// Encode the record.
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError>
    {
        match self {
            Self::Basic(info) => {
                writer.i32(info.suspend_count)?;
                writer.u32(info.virtual_size)?;
                writer.u32(info.resident_size)?;
                info.user_time.encode(writer)?;
                info.system_time.encode(writer)?;
                writer.i32(info.policy)
            }
            Self::ThreadTimes(info) => {
                info.user_time.encode(writer)?;
                info.system_time.encode(writer)
            }
            Self::Events(info) => {
                for field in [
                    info.faults,
                    info.pageins,
                    info.cow_faults,
                    info.messages_sent,
                    info.messages_received,
                    info.syscalls_mach,
                    info.syscalls_unix,
                    info.csw,
                ] {
                    writer.i32(field)?;
                }
                Ok(())
            }
        }
    }
}
