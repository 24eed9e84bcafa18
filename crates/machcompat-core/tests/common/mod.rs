//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use machcompat_core::error::{ShimError, ShimResult};
use machcompat_core::host::{HostKernel, HostSignal};
use machcompat_core::ool::{LocalOolArena, OolTransfer};
use machcompat_core::registry::{LocalRegistry, RightType};
use machcompat_core::types::{
    Credentials, HostThread, Port, PortKind, PortRef, ProcessId, ResourceUsage, ThreadId, ThreadRunState,
};
use machcompat_core::{Shim, TrapContext};
use machcompat_protocol::PortName;

pub const CALLER: ProcessId = ProcessId(100);
pub const TARGET: ProcessId = ProcessId(200);
pub const USER_UID: u32 = 501;

#[derive(Debug, Clone)]
pub struct FakeProcess
{
    pub credentials: Credentials,
    pub threads: Vec<HostThread>,
    pub usage: ResourceUsage,
}

#[derive(Debug, Default)]
struct FakeState
{
    processes: HashMap<ProcessId, FakeProcess>,
    signals: Vec<(ProcessId, HostSignal)>,
    exits: Vec<(ProcessId, i32)>,
    fail_signals: bool,
}

/// Scriptable host: processes, threads and rusage are whatever the test says.
#[derive(Debug, Default)]
pub struct FakeHost
{
    state: Mutex<FakeState>,
}

impl FakeHost
{
    fn lock(&self) -> MutexGuard<'_, FakeState>
    {
        self.state.lock().unwrap()
    }

    pub fn add_process(&self, pid: ProcessId, ruid: u32, euid: u32)
    {
        self.lock().processes.insert(
            pid,
            FakeProcess {
                credentials: Credentials { ruid, euid },
                threads: vec![HostThread {
                    id: ThreadId(u64::from(pid.0)),
                    state: ThreadRunState::Running,
                }],
                usage: ResourceUsage::default(),
            },
        );
    }

    pub fn set_thread_states(&self, pid: ProcessId, states: &[ThreadRunState])
    {
        let threads = states
            .iter()
            .enumerate()
            .map(|(i, state)| HostThread {
                id: ThreadId(u64::from(pid.0) * 1000 + i as u64),
                state: *state,
            })
            .collect();
        self.lock().processes.get_mut(&pid).unwrap().threads = threads;
    }

    pub fn set_usage(&self, pid: ProcessId, usage: ResourceUsage)
    {
        self.lock().processes.get_mut(&pid).unwrap().usage = usage;
    }

    pub fn fail_signals(&self, fail: bool)
    {
        self.lock().fail_signals = fail;
    }

    pub fn signals(&self) -> Vec<(ProcessId, HostSignal)>
    {
        self.lock().signals.clone()
    }

    pub fn exits(&self) -> Vec<(ProcessId, i32)>
    {
        self.lock().exits.clone()
    }

    fn process(&self, pid: ProcessId) -> ShimResult<FakeProcess>
    {
        self.lock()
            .processes
            .get(&pid)
            .cloned()
            .ok_or(ShimError::ProcessNotFound(pid.0))
    }
}

impl HostKernel for FakeHost
{
    fn credentials(&self, pid: ProcessId) -> ShimResult<Credentials>
    {
        Ok(self.process(pid)?.credentials)
    }

    fn threads(&self, pid: ProcessId) -> ShimResult<Vec<HostThread>>
    {
        Ok(self.process(pid)?.threads)
    }

    fn resource_usage(&self, pid: ProcessId) -> ShimResult<ResourceUsage>
    {
        Ok(self.process(pid)?.usage)
    }

    fn signal(&self, pid: ProcessId, signal: HostSignal) -> ShimResult<()>
    {
        self.process(pid)?;
        let mut state = self.lock();
        if state.fail_signals {
            return Err(ShimError::Host {
                operation: "kill",
                errno: libc::EPERM,
            });
        }
        state.signals.push((pid, signal));
        Ok(())
    }

    fn exit(&self, pid: ProcessId, status: i32) -> ShimResult<()>
    {
        self.process(pid)?;
        self.lock().exits.push((pid, status));
        Ok(())
    }
}

/// Out-of-line transfer that always fails to map.
#[derive(Debug, Default)]
pub struct FailingOol;

impl OolTransfer for FailingOol
{
    fn copyout(&self, _task: ProcessId, _data: Vec<u8>) -> ShimResult<u64>
    {
        Err(ShimError::Host {
            operation: "ool copyout",
            errno: libc::ENOMEM,
        })
    }

    fn reclaim(&self, _task: ProcessId, _address: u64) -> Option<Vec<u8>>
    {
        None
    }
}

/// A shim wired to a [`FakeHost`], with `CALLER` and `TARGET` registered
/// and owned by the same user.
pub struct Harness
{
    pub shim: Shim,
    pub registry: Arc<LocalRegistry>,
    pub ool: Arc<LocalOolArena>,
    pub host: Arc<FakeHost>,
}

impl Harness
{
    pub fn new() -> Self
    {
        let registry = Arc::new(LocalRegistry::new());
        let ool = Arc::new(LocalOolArena::new());
        let host = Arc::new(FakeHost::default());
        host.add_process(CALLER, USER_UID, USER_UID);
        host.add_process(TARGET, USER_UID, USER_UID);

        let shim = Shim::new(registry.clone(), ool.clone(), host.clone());
        shim.register_task(CALLER);
        shim.register_task(TARGET);
        Self {
            shim,
            registry,
            ool,
            host,
        }
    }

    /// A shim whose out-of-line copies always fail.
    pub fn with_failing_ool() -> (Shim, Arc<FakeHost>, Arc<LocalRegistry>)
    {
        let host = Arc::new(FakeHost::default());
        host.add_process(CALLER, USER_UID, USER_UID);
        host.add_process(TARGET, USER_UID, USER_UID);
        let registry = Arc::new(LocalRegistry::new());
        let shim = Shim::new(registry.clone(), Arc::new(FailingOol), host.clone());
        shim.register_task(CALLER);
        shim.register_task(TARGET);
        (shim, host, registry)
    }

    pub fn ctx(&self) -> TrapContext
    {
        self.shim.context(CALLER, TARGET).unwrap()
    }

    /// A fresh port the caller holds a right of `kind` to.
    pub fn caller_port(&self, kind: RightType) -> (PortRef, PortName)
    {
        let port = Port::new(PortKind::User);
        let name = self.registry.insert(CALLER, &port, kind);
        (port, name)
    }

    /// Port a caller-side name resolves to.
    pub fn resolve(&self, name: PortName) -> PortRef
    {
        use machcompat_core::registry::{RightFilter, RightRegistry};
        self.registry
            .check_right(CALLER, name, RightFilter::AllRights)
            .and_then(|right| right.port)
            .unwrap()
    }

    /// Port names copied out to the caller at `address`.
    pub fn read_names(&self, address: u64) -> Vec<PortName>
    {
        machcompat_core::ool::decode_port_names(&self.ool.read(CALLER, address).unwrap())
    }
}
