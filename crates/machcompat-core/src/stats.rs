//! # Task Statistics
//!
//! Maps the host's resource-usage accounting onto the `task_info` records.
//!
//! | Flavor | Units | Filled from |
//! |---|---|---|
//! | `TASK_BASIC_INFO` | 10 | rusage times and sizes |
//! | `TASK_THREAD_TIMES_INFO` | 4 | rusage CPU times |
//! | `TASK_EVENTS_INFO` | 8 | fault and message counters |
//!
//! The basic record's suspend count reports the host's context-switch total,
//! not the task's suspend counter. Callers that compare against a real kernel
//! rely on this.

use machcompat_protocol::info::{
    TaskBasicInfo, TaskEventsInfo, TaskInfoFlavor, TaskInfoRecord, TaskThreadTimesInfo, TimeValue,
};
use tracing::debug;

use crate::error::{ShimError, ShimResult};
use crate::types::{ResourceUsage, TimeVal};

fn saturate_i32(value: i64) -> i32
{
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

fn saturate_u32(value: i64) -> u32
{
    u32::try_from(value).unwrap_or(if value < 0 { 0 } else { u32::MAX })
}

fn time_value(tv: TimeVal) -> TimeValue
{
    TimeValue {
        seconds: saturate_i32(tv.sec),
        microseconds: saturate_i32(tv.usec),
    }
}

/// Build the `TASK_BASIC_INFO` record.
#[must_use]
pub fn basic_info(usage: &ResourceUsage) -> TaskBasicInfo
{
    TaskBasicInfo {
        suspend_count: saturate_i32(usage.nvcsw.saturating_add(usage.nivcsw)),
        virtual_size: saturate_u32(usage.ixrss),
        resident_size: saturate_u32(usage.maxrss),
        user_time: time_value(usage.utime),
        system_time: time_value(usage.stime),
        policy: 0,
    }
}

/// Build the `TASK_THREAD_TIMES_INFO` record.
#[must_use]
pub fn thread_times_info(usage: &ResourceUsage) -> TaskThreadTimesInfo
{
    TaskThreadTimesInfo {
        user_time: time_value(usage.utime),
        system_time: time_value(usage.stime),
    }
}

/// Build the `TASK_EVENTS_INFO` record.
#[must_use]
pub fn events_info(usage: &ResourceUsage) -> TaskEventsInfo
{
    TaskEventsInfo {
        faults: saturate_i32(usage.majflt),
        pageins: saturate_i32(usage.minflt),
        cow_faults: 0,
        messages_sent: saturate_i32(usage.msgsnd),
        messages_received: saturate_i32(usage.msgrcv),
        syscalls_mach: 0,
        syscalls_unix: 0,
        csw: 0,
    }
}

/// Resolve `flavor` and check the caller's capacity against its record size.
///
/// Runs before any host statistics are gathered.
///
/// ## Errors
///
/// - `InvalidArgument`: the flavor is not one of the three supported ones
/// - `NoBuffers`: `capacity` (in info units) is smaller than the record
pub fn check_request(flavor: i32, capacity: u32) -> ShimResult<TaskInfoFlavor>
{
    let flavor = TaskInfoFlavor::from_raw(flavor)
        .ok_or_else(|| ShimError::InvalidArgument(format!("unknown task_info flavor {flavor}")))?;

    let needed = flavor.count();
    if capacity < needed {
        debug!(?flavor, needed, offered = capacity, "task_info buffer too small");
        return Err(ShimError::NoBuffers {
            needed,
            offered: capacity,
        });
    }
    Ok(flavor)
}

/// Build the record for an already validated flavor.
#[must_use]
pub fn record(flavor: TaskInfoFlavor, usage: &ResourceUsage) -> TaskInfoRecord
{
    match flavor {
        TaskInfoFlavor::Basic => TaskInfoRecord::Basic(basic_info(usage)),
        TaskInfoFlavor::ThreadTimes => TaskInfoRecord::ThreadTimes(thread_times_info(usage)),
        TaskInfoFlavor::Events => TaskInfoRecord::Events(events_info(usage)),
    }
}

/// [`check_request`] followed by [`record`].
pub fn task_info(flavor: i32, capacity: u32, usage: &ResourceUsage) -> ShimResult<TaskInfoRecord>
{
    check_request(flavor, capacity).map(|flavor| record(flavor, usage))
}

#[cfg(test)]
mod tests
{
    use machcompat_protocol::info::{TASK_BASIC_INFO, TASK_EVENTS_INFO, TASK_THREAD_TIMES_INFO};

    use super::*;

    fn usage() -> ResourceUsage
    {
        ResourceUsage {
            utime: TimeVal { sec: 3, usec: 250 },
            stime: TimeVal { sec: 1, usec: 5 },
            maxrss: 4096,
            ixrss: 1024,
            minflt: 70,
            majflt: 2,
            msgsnd: 11,
            msgrcv: 13,
            nvcsw: 40,
            nivcsw: 2,
        }
    }

    #[test]
    fn test_basic_info_reports_context_switches_as_suspend_count()
    {
        let record = task_info(TASK_BASIC_INFO, TaskBasicInfo::COUNT, &usage()).unwrap();
        let TaskInfoRecord::Basic(info) = record else {
            panic!("expected basic record, got {record:?}");
        };
        assert_eq!(info.suspend_count, 42);
        assert_eq!(info.resident_size, 4096);
        assert_eq!(info.virtual_size, 1024);
        assert_eq!(info.user_time, TimeValue { seconds: 3, microseconds: 250 });
    }

    #[test]
    fn test_capacity_must_cover_record()
    {
        let err = task_info(TASK_BASIC_INFO, TaskBasicInfo::COUNT - 1, &usage()).unwrap_err();
        assert!(matches!(err, ShimError::NoBuffers { needed: 10, offered: 9 }));
        assert!(task_info(TASK_THREAD_TIMES_INFO, 4, &usage()).is_ok());
        assert!(task_info(TASK_EVENTS_INFO, 32, &usage()).is_ok());
    }

    #[test]
    fn test_events_info_fields()
    {
        let info = events_info(&usage());
        assert_eq!(info.faults, 2);
        assert_eq!(info.pageins, 70);
        assert_eq!(info.messages_sent, 11);
        assert_eq!(info.messages_received, 13);
        assert_eq!(info.cow_faults, 0);
        assert_eq!(info.csw, 0);
    }

    #[test]
    fn test_unknown_flavor_is_invalid()
    {
        assert!(matches!(task_info(99, 32, &usage()), Err(ShimError::InvalidArgument(_))));
    }

    #[test]
    fn test_oversized_values_saturate()
    {
        let mut big = usage();
        big.maxrss = i64::MAX;
        big.nvcsw = i64::MAX;
        let info = basic_info(&big);
        assert_eq!(info.resident_size, u32::MAX);
        assert_eq!(info.suspend_count, i32::MAX);
    }
}
