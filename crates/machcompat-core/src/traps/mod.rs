//! # Trap Dispatch
//!
//! [`Shim`] owns the task table and the injected collaborators (right
//! registry, out-of-line transfer, host kernel) and answers task-control
//! traps.
//!
//! Every trap is a method taking an explicit [`TrapContext`]: the calling
//! task's PID (whose namespace names are resolved in and rights are given to)
//! and the target task. Methods return `ShimResult<TrapReply>`; turning an
//! error into the shared error reply happens once, in
//! [`Shim::handle_message`].
//!
//! ## Routing
//!
//! | Trap | Method |
//! |---|---|
//! | `task_terminate` | [`Shim::task_terminate`] |
//! | `task_threads` | [`Shim::task_threads`] |
//! | `mach_ports_lookup` | [`Shim::mach_ports_lookup`] |
//! | `task_info` | [`Shim::task_info`] |
//! | `task_suspend` / `task_resume` | [`Shim::task_suspend`] / [`Shim::task_resume`] |
//! | `task_get_special_port` / `task_set_special_port` | [`Shim::task_get_special_port`] / [`Shim::task_set_special_port`] |
//! | `task_get_exception_ports` / `task_set_exception_ports` | [`Shim::task_get_exception_ports`] / [`Shim::task_set_exception_ports`] |
//! | `thread_create` / `thread_create_running` | unsupported stubs |
//!
//! `task_for_pid` is not a message trap; see [`Shim::task_for_pid`].

mod control;
mod exception_ports;
mod info;
mod special_ports;
mod task_for_pid;
mod threads;
mod unsupported;

pub use unsupported::UNSUPPORTED_ROUTINES;

use std::sync::Arc;

use machcompat_protocol::header::MSG_TRAILER_SIZE;
use machcompat_protocol::wire::WireReader;
use machcompat_protocol::{
    MsgHeader, PortName, Request, TrapId, TrapReply, TrapRequest, WireError, MACH_PORT_DEAD, MACH_PORT_NULL,
};
use tracing::{debug, info, info_span, warn};

use crate::config::ShimConfig;
use crate::errno;
use crate::error::{ShimError, ShimResult};
use crate::host::HostKernel;
use crate::ool::{decode_port_names, OolTransfer};
use crate::registry::{RightRegistry, RightType};
use crate::task::{Task, TaskState, TaskTable};
use crate::types::{Port, PortKind, PortRef, ProcessId};

/// Who is calling and which task the trap acts on.
#[derive(Debug, Clone)]
pub struct TrapContext
{
    /// Calling task; names in the request live in its namespace
    pub caller: ProcessId,
    /// Task the trap operates on
    pub target: Arc<Task>,
}

impl TrapContext
{
    /// PID of the target task.
    #[must_use]
    pub fn target_pid(&self) -> ProcessId
    {
        self.target.pid()
    }
}

/// The task-control trap server.
pub struct Shim
{
    registry: Arc<dyn RightRegistry>,
    ool: Arc<dyn OolTransfer>,
    host: Arc<dyn HostKernel>,
    tasks: TaskTable,
    host_port: PortRef,
    bootstrap_port: PortRef,
    config: ShimConfig,
}

impl Shim
{
    /// Create a shim over the given collaborators with default limits.
    pub fn new(registry: Arc<dyn RightRegistry>, ool: Arc<dyn OolTransfer>, host: Arc<dyn HostKernel>) -> Self
    {
        Self::with_config(registry, ool, host, ShimConfig::default())
    }

    /// Create a shim with explicit limits.
    pub fn with_config(
        registry: Arc<dyn RightRegistry>,
        ool: Arc<dyn OolTransfer>,
        host: Arc<dyn HostKernel>,
        config: ShimConfig,
    ) -> Self
    {
        Self {
            registry,
            ool,
            host,
            tasks: TaskTable::new(),
            host_port: Port::new(PortKind::Host),
            bootstrap_port: Port::new(PortKind::Bootstrap),
            config,
        }
    }

    /// The injected right registry.
    pub fn registry(&self) -> &Arc<dyn RightRegistry>
    {
        &self.registry
    }

    /// The injected host kernel.
    pub fn host(&self) -> &Arc<dyn HostKernel>
    {
        &self.host
    }

    /// Active limits.
    #[must_use]
    pub fn config(&self) -> &ShimConfig
    {
        &self.config
    }

    /// Registered tasks.
    #[must_use]
    pub fn tasks(&self) -> &TaskTable
    {
        &self.tasks
    }

    /// The host port every new task starts with.
    #[must_use]
    pub fn host_port(&self) -> &PortRef
    {
        &self.host_port
    }

    /// The bootstrap port every new task starts with.
    #[must_use]
    pub fn bootstrap_port(&self) -> &PortRef
    {
        &self.bootstrap_port
    }

    /// Start emulating `pid`.
    ///
    /// Creates the task's kernel port and binds the shared host and bootstrap
    /// ports. Registering an already known PID returns the existing task.
    pub fn register_task(&self, pid: ProcessId) -> Arc<Task>
    {
        let (task, created) = self.tasks.get_or_insert_with(pid, || {
            let kernel = Port::new(PortKind::Task(pid));
            Task::new(pid, TaskState::new(&kernel, &self.host_port, &self.bootstrap_port))
        });
        if created {
            info!(%pid, "task registered");
        }
        task
    }

    /// Stop emulating `pid`.
    ///
    /// The task's state, and every reference it owns, goes away once the last
    /// in-flight trap holding it finishes.
    pub fn unregister_task(&self, pid: ProcessId) -> bool
    {
        let removed = self.tasks.remove(pid).is_some();
        if removed {
            info!(%pid, "task unregistered");
        }
        removed
    }

    /// Registered task for `pid`.
    ///
    /// ## Errors
    ///
    /// `UnknownTask` if `pid` is not emulated.
    pub fn task(&self, pid: ProcessId) -> ShimResult<Arc<Task>>
    {
        self.tasks.get(pid).ok_or(ShimError::UnknownTask(pid.0))
    }

    /// Give `task` a send right to each of `ports`.
    ///
    /// On failure the rights already minted are taken back.
    fn send_rights<'a>(
        &self,
        task: ProcessId,
        ports: impl IntoIterator<Item = &'a PortRef>,
    ) -> ShimResult<Vec<PortName>>
    {
        let mut names = Vec::new();
        for port in ports {
            match self.registry.get_right(task, port, RightType::Send) {
                Ok(name) => names.push(name),
                Err(err) => {
                    self.release_rights(task, &names);
                    return Err(err);
                }
            }
        }
        Ok(names)
    }

    /// Take back rights minted for a reply `task` will not receive.
    fn release_rights(&self, task: ProcessId, names: &[PortName])
    {
        for &name in names {
            if name == MACH_PORT_NULL || name == MACH_PORT_DEAD {
                continue;
            }
            if let Err(err) = self.registry.release_right(task, name) {
                warn!(%task, name, error = %err, "could not release right");
            }
        }
    }

    /// Undo everything a successful `reply` handed to `task`.
    fn discard_reply(&self, task: ProcessId, reply: &TrapReply)
    {
        match reply {
            TrapReply::SpecialPort(name) => self.release_rights(task, &[*name]),
            TrapReply::ExceptionPorts(entries) => {
                let names: Vec<PortName> = entries.iter().map(|entry| entry.port).collect();
                self.release_rights(task, &names);
            }
            TrapReply::PortsLookup { ports: ool, .. } | TrapReply::Threads { threads: ool, .. } => {
                if let Some(bytes) = self.ool.reclaim(task, ool.address) {
                    self.release_rights(task, &decode_port_names(&bytes));
                }
            }
            TrapReply::Retval(_) | TrapReply::Info(_) => {}
        }
    }

    /// Build the context for a trap from `caller` on `target`.
    pub fn context(&self, caller: ProcessId, target: ProcessId) -> ShimResult<TrapContext>
    {
        Ok(TrapContext {
            caller,
            target: self.task(target)?,
        })
    }

    /// Run a decoded request.
    pub fn dispatch(&self, ctx: &TrapContext, request: &Request) -> ShimResult<TrapReply>
    {
        debug!(trap = request.trap.name(), "dispatching");
        match request.body {
            TrapRequest::GetSpecialPort { which } => self.task_get_special_port(ctx, which),
            TrapRequest::SetSpecialPort { which, port } => self.task_set_special_port(ctx, which, port.name),
            TrapRequest::Info { flavor, count } => self.task_info(ctx, flavor, count),
            TrapRequest::GetExceptionPorts { mask } => self.task_get_exception_ports(ctx, mask),
            TrapRequest::SetExceptionPorts {
                mask,
                port,
                behavior,
                flavor,
            } => self.task_set_exception_ports(ctx, mask, port.name, behavior, flavor),
            TrapRequest::Empty => match request.trap {
                TrapId::Terminate => self.task_terminate(ctx),
                TrapId::Threads => self.task_threads(ctx),
                TrapId::PortsLookup => self.mach_ports_lookup(ctx),
                TrapId::Suspend => self.task_suspend(ctx),
                TrapId::Resume => self.task_resume(ctx),
                TrapId::ThreadCreate => self.thread_create_from_user(ctx),
                TrapId::ThreadCreateRunning => self.thread_create_running_from_user(ctx),
                other => Err(WireError::UnknownMessage(other.msg_id()).into()),
            },
        }
    }

    /// Answer one request message.
    ///
    /// Decodes `request`, runs the trap from `caller` against `target` and
    /// writes the reply (trailer included) into `reply`. A failing trap still
    /// produces a reply: the shared error encoding carrying
    /// [`ShimError::retval`]. Returns the number of bytes written.
    ///
    /// ## Errors
    ///
    /// Only framing failures surface here: a request too short to carry a
    /// header, or a reply buffer too small for even a bare return code. That
    /// check runs before the trap, so a rejected message has no effect. A
    /// successful reply that does not fit is replaced by an `ENOBUFS` return
    /// code, and the rights and out-of-line regions it carried are taken back.
    pub fn handle_message(
        &self,
        caller: ProcessId,
        target: ProcessId,
        request: &[u8],
        reply: &mut [u8],
    ) -> ShimResult<usize>
    {
        let header = MsgHeader::decode(&mut WireReader::new(request))?;
        let span = info_span!("trap", id = header.id, %caller, %target);
        let _enter = span.enter();

        // Refuse before the trap runs so a short buffer commits nothing
        let minimum = TrapReply::Retval(0).encoded_len() + MSG_TRAILER_SIZE;
        if reply.len() < minimum {
            return Err(WireError::BufferTooSmall {
                needed: minimum,
                capacity: reply.len(),
            }
            .into());
        }

        let outcome = Request::decode(request)
            .map_err(ShimError::from)
            .and_then(|request| self.dispatch(&self.context(caller, target)?, &request));

        let body = match outcome {
            Ok(body) => body,
            Err(err) => {
                let retval = err.retval();
                debug!(error = %err, retval, "trap failed");
                TrapReply::Retval(retval)
            }
        };
        let written = match body.encode(&header, reply) {
            Ok(written) => written,
            Err(WireError::BufferTooSmall { needed, capacity }) => {
                debug!(needed, capacity, "reply does not fit, sending ENOBUFS");
                self.discard_reply(caller, &body);
                TrapReply::Retval(errno::to_foreign(libc::ENOBUFS)).encode(&header, reply)?
            }
            Err(err) => return Err(err.into()),
        };
        debug!(bytes = written, "reply written");
        Ok(written)
    }
}
