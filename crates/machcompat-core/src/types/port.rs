//! # Kernel Ports and Owned References
//!
//! A [`Port`] is the kernel object a right names. Ports carry a Mach-level
//! reference count that is independent of the `Arc` keeping the Rust value
//! alive: it counts how many bindings (task slots, exception slots, rights in
//! some namespace) currently hold the port.
//!
//! References are only ever taken through [`PortHandle`], an RAII guard that
//! acquires one reference on construction and releases it on drop. Storing a
//! handle in task state transfers that reference to the state; overwriting the
//! slot drops the previous handle and with it the previous reference.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::process::{ProcessId, ThreadId};

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared pointer to a kernel port.
pub type PortRef = Arc<Port>;

/// What kernel object a port stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind
{
    /// Kernel port of a task
    Task(ProcessId),
    /// Kernel port of a thread
    Thread(ProcessId, ThreadId),
    /// The host port
    Host,
    /// The bootstrap (name server) port
    Bootstrap,
    /// A port allocated by a task for its own use (e.g. an exception handler)
    User,
}

/// Registered exception-handler parameters, passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionInfo
{
    /// Thread-state flavor the handler wants
    pub flavor: i32,
    /// Exception behavior the handler wants
    pub behavior: i32,
}

/// Out-of-band data attached to a port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PortData
{
    /// Nothing attached
    #[default]
    None,
    /// The port is bound as an exception handler
    ExceptionInfo(ExceptionInfo),
    /// Some other subsystem owns the port's data
    Other(&'static str),
}

/// A kernel object addressable through rights.
pub struct Port
{
    id: u64,
    kind: PortKind,
    refs: AtomicUsize,
    data: Mutex<PortData>,
}

impl Port
{
    /// Allocate a new port with no references.
    #[must_use]
    pub fn new(kind: PortKind) -> PortRef
    {
        Arc::new(Self {
            id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            refs: AtomicUsize::new(0),
            data: Mutex::new(PortData::None),
        })
    }

    /// Unique object id (stable for the port's lifetime).
    #[must_use]
    pub fn id(&self) -> u64
    {
        self.id
    }

    /// Object kind.
    #[must_use]
    pub fn kind(&self) -> PortKind
    {
        self.kind
    }

    /// Current Mach reference count.
    #[must_use]
    pub fn ref_count(&self) -> usize
    {
        self.refs.load(Ordering::Acquire)
    }

    /// Lock the port's attached data.
    pub fn data(&self) -> MutexGuard<'_, PortData>
    {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether two refs name the same kernel object.
    #[must_use]
    pub fn same(a: &PortRef, b: &PortRef) -> bool
    {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Debug for Port
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}

/// One owned Mach reference on a port.
///
/// Dropping the handle releases the reference, so a slot holding a
/// `PortHandle` can never leak or double-release.
pub struct PortHandle
{
    port: PortRef,
}

impl PortHandle
{
    /// Take a new reference on `port`.
    #[must_use]
    pub fn acquire(port: &PortRef) -> Self
    {
        let refs = port.refs.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(port = port.id, refs, "port reference acquired");
        Self { port: Arc::clone(port) }
    }

    /// The referenced port.
    #[must_use]
    pub fn port(&self) -> &PortRef
    {
        &self.port
    }

    /// Whether this handle references `port`.
    #[must_use]
    pub fn is(&self, port: &PortRef) -> bool
    {
        Port::same(&self.port, port)
    }
}

impl Clone for PortHandle
{
    fn clone(&self) -> Self
    {
        Self::acquire(&self.port)
    }
}

impl Drop for PortHandle
{
    fn drop(&mut self)
    {
        let previous = self.port.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "port reference count underflow");
        if previous == 1 {
            trace!(port = self.port.id, kind = ?self.port.kind, "last port reference released");
        }
    }
}

impl fmt::Debug for PortHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_tuple("PortHandle").field(&self.port).finish()
    }
}
