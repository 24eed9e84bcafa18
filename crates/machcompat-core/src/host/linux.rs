//! # Linux Host
//!
//! [`HostKernel`] on Linux. Process information comes from procfs; signals go
//! through `kill(2)`.
//!
//! ## Sources
//!
//! | Need | Source |
//! |---|---|
//! | Credentials | `/proc/<pid>/status`, `Uid:` line |
//! | Threads | `/proc/<pid>/task/<tid>/stat`, state field |
//! | CPU time, faults | `/proc/<pid>/stat` (or `getrusage(2)` for ourselves) |
//! | Context switches, peak RSS | `/proc/<pid>/status` |

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, trace, warn};

use super::{HostKernel, HostSignal};
use crate::error::{ShimError, ShimResult};
use crate::types::{Credentials, HostThread, ProcessId, ResourceUsage, ThreadId, ThreadRunState, TimeVal};

/// Host backed by procfs and libc.
#[derive(Debug, Clone)]
pub struct LinuxHost
{
    proc_root: PathBuf,
}

impl Default for LinuxHost
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl LinuxHost
{
    /// Host reading the system procfs.
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    fn process_dir(&self, pid: ProcessId) -> PathBuf
    {
        self.proc_root.join(pid.0.to_string())
    }

    fn read_proc(&self, pid: ProcessId, file: &str) -> ShimResult<String>
    {
        let path = self.process_dir(pid).join(file);
        fs::read_to_string(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ShimError::ProcessNotFound(pid.0),
            _ => ShimError::Io(err),
        })
    }
}

/// `getpid(2)` as a [`ProcessId`].
#[must_use]
pub fn current_pid() -> ProcessId
{
    ProcessId(std::process::id())
}

/// Map a procfs state letter to a run state.
///
/// Sleeping, disk-wait and stopped threads are all blocked from the
/// scheduler's point of view.
#[must_use]
pub fn run_state_from_letter(letter: char) -> ThreadRunState
{
    match letter {
        'R' => ThreadRunState::Running,
        'S' | 'D' | 'T' | 't' | 'I' => ThreadRunState::Inhibited,
        'Z' | 'X' | 'x' => ThreadRunState::Zombie,
        other => ThreadRunState::Unknown(other),
    }
}

/// Fields of a `stat` line that follow the parenthesised command name.
///
/// The command may itself contain spaces and parentheses, so the split happens
/// at the last `)`.
fn stat_fields(stat: &str) -> Option<Vec<&str>>
{
    let (_, rest) = stat.rsplit_once(')')?;
    Some(rest.split_whitespace().collect())
}

/// State letter from a `stat` line.
fn parse_stat_state(stat: &str) -> Option<char>
{
    stat_fields(stat)?.first()?.chars().next()
}

/// Real and effective uid from a `status` file.
fn parse_uid(status: &str) -> Option<Credentials>
{
    let line = status.lines().find(|line| line.starts_with("Uid:"))?;
    let mut ids = line["Uid:".len()..].split_whitespace();
    let ruid = ids.next()?.parse().ok()?;
    let euid = ids.next()?.parse().ok()?;
    Some(Credentials { ruid, euid })
}

/// Numeric value of a `Key:\tvalue [kB]` line in a `status` file.
fn parse_status_value(status: &str, key: &str) -> Option<i64>
{
    status
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

fn ticks_to_timeval(ticks: i64, ticks_per_second: i64) -> TimeVal
{
    if ticks_per_second <= 0 {
        return TimeVal::default();
    }
    TimeVal {
        sec: ticks / ticks_per_second,
        usec: (ticks % ticks_per_second) * 1_000_000 / ticks_per_second,
    }
}

/// Resource usage from a process's `stat` and `status` files.
fn parse_usage(stat: &str, status: &str, ticks_per_second: i64) -> Option<ResourceUsage>
{
    let fields = stat_fields(stat)?;
    // Offsets are relative to the state field (field 3 in proc(5))
    let field = |n: usize| -> Option<i64> { fields.get(n - 3)?.parse().ok() };

    Some(ResourceUsage {
        utime: ticks_to_timeval(field(14)?, ticks_per_second),
        stime: ticks_to_timeval(field(15)?, ticks_per_second),
        maxrss: parse_status_value(status, "VmHWM").unwrap_or(0),
        ixrss: 0,
        minflt: field(10)?,
        majflt: field(12)?,
        msgsnd: 0,
        msgrcv: 0,
        nvcsw: parse_status_value(status, "voluntary_ctxt_switches").unwrap_or(0),
        nivcsw: parse_status_value(status, "nonvoluntary_ctxt_switches").unwrap_or(0),
    })
}

fn self_usage() -> ShimResult<ResourceUsage>
{
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    // SAFETY: `usage` is a valid, writable rusage
    let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if result != 0 {
        return Err(ShimError::last_os("getrusage"));
    }
    let timeval = |tv: libc::timeval| TimeVal {
        sec: i64::from(tv.tv_sec),
        usec: i64::from(tv.tv_usec),
    };
    Ok(ResourceUsage {
        utime: timeval(usage.ru_utime),
        stime: timeval(usage.ru_stime),
        maxrss: i64::from(usage.ru_maxrss),
        ixrss: i64::from(usage.ru_ixrss),
        minflt: i64::from(usage.ru_minflt),
        majflt: i64::from(usage.ru_majflt),
        msgsnd: i64::from(usage.ru_msgsnd),
        msgrcv: i64::from(usage.ru_msgrcv),
        nvcsw: i64::from(usage.ru_nvcsw),
        nivcsw: i64::from(usage.ru_nivcsw),
    })
}

fn ticks_per_second() -> i64
{
    // SAFETY: sysconf has no preconditions
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        i64::from(ticks)
    } else {
        100
    }
}

impl HostKernel for LinuxHost
{
    fn credentials(&self, pid: ProcessId) -> ShimResult<Credentials>
    {
        let status = self.read_proc(pid, "status")?;
        parse_uid(&status).ok_or_else(|| ShimError::InvalidArgument(format!("unparsable Uid line for PID {pid}")))
    }

    fn threads(&self, pid: ProcessId) -> ShimResult<Vec<HostThread>>
    {
        let task_dir = self.process_dir(pid).join("task");
        let entries = fs::read_dir(&task_dir).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ShimError::ProcessNotFound(pid.0),
            _ => ShimError::Io(err),
        })?;

        let mut threads = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(tid) = entry.file_name().to_str().and_then(|name| name.parse::<u64>().ok()) else {
                continue;
            };
            // A thread may exit between readdir and read
            let state = match fs::read_to_string(entry.path().join("stat")) {
                Ok(stat) => parse_stat_state(&stat).map_or(ThreadRunState::Unknown('?'), run_state_from_letter),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    trace!(%pid, tid, "thread vanished during enumeration");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            threads.push(HostThread {
                id: ThreadId(tid),
                state,
            });
        }
        threads.sort_by_key(|thread| thread.id);
        debug!(%pid, count = threads.len(), "enumerated host threads");
        Ok(threads)
    }

    fn resource_usage(&self, pid: ProcessId) -> ShimResult<ResourceUsage>
    {
        if pid == current_pid() {
            return self_usage();
        }
        let stat = self.read_proc(pid, "stat")?;
        let status = self.read_proc(pid, "status")?;
        parse_usage(&stat, &status, ticks_per_second())
            .ok_or_else(|| ShimError::InvalidArgument(format!("unparsable stat for PID {pid}")))
    }

    fn signal(&self, pid: ProcessId, signal: HostSignal) -> ShimResult<()>
    {
        let raw_pid = libc::pid_t::try_from(pid.0)
            .map_err(|_| ShimError::InvalidArgument(format!("PID {pid} out of range")))?;
        // SAFETY: kill has no memory preconditions
        let result = unsafe { libc::kill(raw_pid, signal.number()) };
        if result != 0 {
            let err = ShimError::last_os("kill");
            warn!(%pid, ?signal, error = %err, "signal delivery failed");
            return Err(err);
        }
        trace!(%pid, ?signal, "signal delivered");
        Ok(())
    }

    fn exit(&self, pid: ProcessId, status: i32) -> ShimResult<()>
    {
        if pid == current_pid() {
            debug!(status, "terminating own process");
            std::process::exit(status);
        }
        let raw_pid = libc::pid_t::try_from(pid.0)
            .map_err(|_| ShimError::InvalidArgument(format!("PID {pid} out of range")))?;
        // SAFETY: kill has no memory preconditions
        let result = unsafe { libc::kill(raw_pid, libc::SIGKILL) };
        if result != 0 {
            return Err(ShimError::last_os("kill"));
        }
        debug!(%pid, "terminated foreign process");
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    const STAT: &str = "4242 (my (weird) cmd) S 1 4242 4242 0 -1 4194304 150 0 3 0 250 75 0 0 20 0 2 0 100 0 0";

    #[test]
    fn test_state_letters()
    {
        assert_eq!(run_state_from_letter('R'), ThreadRunState::Running);
        assert_eq!(run_state_from_letter('S'), ThreadRunState::Inhibited);
        assert_eq!(run_state_from_letter('T'), ThreadRunState::Inhibited);
        assert_eq!(run_state_from_letter('Z'), ThreadRunState::Zombie);
        assert_eq!(run_state_from_letter('W'), ThreadRunState::Unknown('W'));
    }

    #[test]
    fn test_stat_parsing_survives_parenthesised_command()
    {
        assert_eq!(parse_stat_state(STAT), Some('S'));
        let usage = parse_usage(STAT, "voluntary_ctxt_switches:\t12\nnonvoluntary_ctxt_switches:\t3\n", 100).unwrap();
        assert_eq!(usage.minflt, 150);
        assert_eq!(usage.majflt, 3);
        assert_eq!(usage.utime, TimeVal { sec: 2, usec: 500_000 });
        assert_eq!(usage.stime, TimeVal { sec: 0, usec: 750_000 });
        assert_eq!(usage.nvcsw, 12);
        assert_eq!(usage.nivcsw, 3);
    }

    #[test]
    fn test_uid_line()
    {
        let status = "Name:\tcat\nUid:\t1000\t0\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n";
        assert_eq!(parse_uid(status), Some(Credentials { ruid: 1000, euid: 0 }));
        assert_eq!(parse_uid("Name:\tcat\n"), None);
    }

    #[test]
    fn test_own_process_is_visible()
    {
        let host = LinuxHost::new();
        let pid = current_pid();
        let threads = host.threads(pid).unwrap();
        assert!(!threads.is_empty());
        assert!(host.credentials(pid).is_ok());
        assert!(host.resource_usage(pid).is_ok());
    }

    #[test]
    fn test_missing_process()
    {
        let host = LinuxHost::new();
        // PIDs are bounded by pid_max, which never reaches this value
        let pid = ProcessId(u32::MAX - 1);
        assert!(matches!(host.credentials(pid), Err(ShimError::ProcessNotFound(_))));
    }
}
