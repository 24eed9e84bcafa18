//! # Task Emulation State
//!
//! One [`Task`] exists per emulated process, from registration until the
//! process exits or is unregistered. Its mutable state lives behind a single
//! mutex: every read-modify-write a trap performs (swapping a special port,
//! applying an exception mask, moving the suspend counter) happens inside one
//! critical section.
//!
//! Every port reference the task owns is a [`PortHandle`], so dropping the
//! state releases them all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::exception::ExceptionTable;
use crate::types::{HostThread, Port, PortHandle, PortKind, PortRef, ProcessId, ThreadId};

/// Number of slots in the `mach_ports_lookup` array.
pub const TASK_PORT_SLOTS: usize = 7;

/// Selector for `task_get_special_port` / `task_set_special_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialPort
{
    /// `TASK_KERNEL_PORT`
    Kernel = 1,
    /// `TASK_HOST_PORT`
    Host = 2,
    /// `TASK_BOOTSTRAP_PORT`
    Bootstrap = 4,
    /// `TASK_WIRED_LEDGER_PORT` (not implemented)
    WiredLedger = 5,
    /// `TASK_PAGED_LEDGER_PORT` (not implemented)
    PagedLedger = 6,
}

impl SpecialPort
{
    /// The selectors a task actually stores.
    pub const BOUND: [SpecialPort; 3] = [SpecialPort::Kernel, SpecialPort::Host, SpecialPort::Bootstrap];

    /// Parse a raw selector.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self>
    {
        match raw {
            1 => Some(Self::Kernel),
            2 => Some(Self::Host),
            4 => Some(Self::Bootstrap),
            5 => Some(Self::WiredLedger),
            6 => Some(Self::PagedLedger),
            _ => None,
        }
    }

    /// Raw selector value, which is also the slot index in the lookup array.
    #[must_use]
    pub fn raw(self) -> i32
    {
        self as i32
    }
}

/// Mutable per-task state.
#[derive(Debug)]
pub struct TaskState
{
    kernel: PortHandle,
    host: PortHandle,
    bootstrap: PortHandle,
    /// Suspend counter. Resume may drive it below zero.
    pub suspend_count: i32,
    /// Bound exception handlers
    pub exceptions: ExceptionTable,
    thread_ports: HashMap<ThreadId, PortHandle>,
}

impl TaskState
{
    /// Fresh state with the three well-known ports bound.
    #[must_use]
    pub fn new(kernel: &PortRef, host: &PortRef, bootstrap: &PortRef) -> Self
    {
        Self {
            kernel: PortHandle::acquire(kernel),
            host: PortHandle::acquire(host),
            bootstrap: PortHandle::acquire(bootstrap),
            suspend_count: 0,
            exceptions: ExceptionTable::new(),
            thread_ports: HashMap::new(),
        }
    }

    fn slot(&self, which: SpecialPort) -> Option<&PortHandle>
    {
        match which {
            SpecialPort::Kernel => Some(&self.kernel),
            SpecialPort::Host => Some(&self.host),
            SpecialPort::Bootstrap => Some(&self.bootstrap),
            SpecialPort::WiredLedger | SpecialPort::PagedLedger => None,
        }
    }

    /// Port bound to `which`; `None` for the ledger selectors.
    #[must_use]
    pub fn special(&self, which: SpecialPort) -> Option<&PortRef>
    {
        self.slot(which).map(PortHandle::port)
    }

    /// Bind `port` to `which`.
    ///
    /// The new reference is taken before the old one is released. Returns
    /// `false` (and changes nothing) for the ledger selectors.
    pub fn replace_special(&mut self, which: SpecialPort, port: &PortRef) -> bool
    {
        let slot = match which {
            SpecialPort::Kernel => &mut self.kernel,
            SpecialPort::Host => &mut self.host,
            SpecialPort::Bootstrap => &mut self.bootstrap,
            SpecialPort::WiredLedger | SpecialPort::PagedLedger => return false,
        };
        let new = PortHandle::acquire(port);
        let old = std::mem::replace(slot, new);
        trace!(?which, old = old.port().id(), new = port.id(), "special port replaced");
        drop(old);
        true
    }

    /// Kernel port of thread `tid`, created on first use.
    pub fn thread_port(&mut self, pid: ProcessId, tid: ThreadId) -> PortRef
    {
        self.thread_ports
            .entry(tid)
            .or_insert_with(|| PortHandle::acquire(&Port::new(PortKind::Thread(pid, tid))))
            .port()
            .clone()
    }

    /// Forget ports of threads missing from `live`.
    pub fn prune_thread_ports(&mut self, live: &[HostThread])
    {
        let before = self.thread_ports.len();
        self.thread_ports
            .retain(|tid, _| live.iter().any(|thread| thread.id == *tid));
        let pruned = before - self.thread_ports.len();
        if pruned > 0 {
            trace!(pruned, "dropped ports of exited threads");
        }
    }

    /// Number of thread ports currently held.
    #[must_use]
    pub fn thread_port_count(&self) -> usize
    {
        self.thread_ports.len()
    }
}

/// An emulated task.
#[derive(Debug)]
pub struct Task
{
    pid: ProcessId,
    state: Mutex<TaskState>,
}

impl Task
{
    /// Wrap `state` for `pid`.
    #[must_use]
    pub fn new(pid: ProcessId, state: TaskState) -> Self
    {
        Self {
            pid,
            state: Mutex::new(state),
        }
    }

    /// Host process backing the task.
    #[must_use]
    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// Enter the task's critical section.
    pub fn lock(&self) -> MutexGuard<'_, TaskState>
    {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registered tasks keyed by PID.
#[derive(Debug, Default)]
pub struct TaskTable
{
    tasks: RwLock<HashMap<ProcessId, Arc<Task>>>,
}

impl TaskTable
{
    /// Empty table.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ProcessId, Arc<Task>>>
    {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ProcessId, Arc<Task>>>
    {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Task for `pid`, if registered.
    #[must_use]
    pub fn get(&self, pid: ProcessId) -> Option<Arc<Task>>
    {
        self.read().get(&pid).cloned()
    }

    /// Existing task for `pid`, or the one `create` builds.
    pub fn get_or_insert_with(&self, pid: ProcessId, create: impl FnOnce() -> Task) -> (Arc<Task>, bool)
    {
        let mut tasks = self.write();
        if let Some(task) = tasks.get(&pid) {
            return (Arc::clone(task), false);
        }
        let task = Arc::new(create());
        tasks.insert(pid, Arc::clone(&task));
        (task, true)
    }

    /// Remove and return the task for `pid`.
    pub fn remove(&self, pid: ProcessId) -> Option<Arc<Task>>
    {
        self.write().remove(&pid)
    }

    /// Registered PIDs in ascending order.
    #[must_use]
    pub fn pids(&self) -> Vec<ProcessId>
    {
        let mut pids: Vec<_> = self.read().keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.read().len()
    }

    /// Whether no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}
