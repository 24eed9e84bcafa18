//! # Right Registry
//!
//! The registry owns every task's capability namespace: the mapping from port
//! names to rights and from rights to kernel ports. Trap code never touches a
//! namespace directly; it asks the registry to insert a right for a port
//! ([`RightRegistry::get_right`]) or to resolve a name the caller supplied
//! ([`RightRegistry::check_right`]).
//!
//! The registry is a shared, internally synchronised service injected into
//! [`crate::Shim`] at construction. It must never call back into task state, so
//! trap code may hold a task lock while calling it.
//!
//! [`LocalRegistry`] is an in-process implementation used by the CLI and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use machcompat_protocol::{PortName, MACH_PORT_NULL};
use tracing::{debug, trace};

use crate::error::{ShimError, ShimResult};
use crate::types::{PortHandle, PortRef, ProcessId};

/// Kind of right a name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RightType
{
    /// `MACH_PORT_TYPE_SEND`
    Send,
    /// `MACH_PORT_TYPE_RECEIVE`
    Receive,
    /// `MACH_PORT_TYPE_SEND_ONCE`
    SendOnce,
    /// `MACH_PORT_TYPE_DEAD_NAME`: the port behind the right is gone
    DeadName,
}

/// Which right kinds a check accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RightFilter
{
    /// Only send rights
    Send,
    /// Any right, dead names included (`MACH_PORT_TYPE_ALL_RIGHTS`)
    AllRights,
}

impl RightFilter
{
    /// Whether a right of `kind` passes the filter.
    #[must_use]
    pub fn accepts(self, kind: RightType) -> bool
    {
        match self {
            RightFilter::Send => kind == RightType::Send,
            RightFilter::AllRights => true,
        }
    }
}

/// A right resolved from a caller-supplied name.
#[derive(Debug, Clone)]
pub struct CheckedRight
{
    /// The name the caller used
    pub name: PortName,
    /// Kind of right
    pub kind: RightType,
    /// Port behind the right; `None` for dead names
    pub port: Option<PortRef>,
}

/// Capability registry the trap layer calls into.
pub trait RightRegistry: Send + Sync
{
    /// Give `task` a right of `kind` to `port` and return its name.
    ///
    /// If the task already holds such a right the existing name is returned
    /// and its user-reference count grows.
    fn get_right(&self, task: ProcessId, port: &PortRef, kind: RightType) -> ShimResult<PortName>;

    /// Resolve `name` in `task`'s namespace, if it denotes a right `filter`
    /// accepts.
    fn check_right(&self, task: ProcessId, name: PortName, filter: RightFilter) -> Option<CheckedRight>;

    /// Take back one user reference handed out by [`RightRegistry::get_right`].
    ///
    /// Used when the message carrying the right never reaches `task`.
    fn release_right(&self, task: ProcessId, name: PortName) -> ShimResult<()>;
}

#[derive(Debug)]
struct Right
{
    kind: RightType,
    handle: Option<PortHandle>,
    user_refs: u32,
}

#[derive(Debug, Default)]
struct Namespace
{
    next_index: u32,
    rights: HashMap<PortName, Right>,
}

impl Namespace
{
    /// Names look like XNU's: a table index in the high bits, generation 3.
    fn allocate_name(&mut self) -> PortName
    {
        self.next_index += 1;
        (self.next_index << 8) | 0x03
    }

    fn find(&self, port: &PortRef, kind: RightType) -> Option<PortName>
    {
        self.rights.iter().find_map(|(name, right)| {
            let same_port = right.handle.as_ref().is_some_and(|handle| handle.is(port));
            (same_port && right.kind == kind).then_some(*name)
        })
    }
}

/// In-process registry keeping one namespace per task.
#[derive(Debug, Default)]
pub struct LocalRegistry
{
    namespaces: Mutex<HashMap<ProcessId, Namespace>>,
}

impl LocalRegistry
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessId, Namespace>>
    {
        self.namespaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a fresh right (never merged with an existing one).
    ///
    /// Used to hand a task a receive right for a port it allocated, or a send
    /// right under a new name.
    pub fn insert(&self, task: ProcessId, port: &PortRef, kind: RightType) -> PortName
    {
        let mut namespaces = self.lock();
        let namespace = namespaces.entry(task).or_default();
        let name = namespace.allocate_name();
        namespace.rights.insert(
            name,
            Right {
                kind,
                handle: Some(PortHandle::acquire(port)),
                user_refs: 1,
            },
        );
        trace!(%task, name, ?kind, "right inserted");
        name
    }

    /// Turn `name` into a dead name, releasing its port reference.
    ///
    /// Returns `false` if the name does not exist.
    pub fn mark_dead(&self, task: ProcessId, name: PortName) -> bool
    {
        let mut namespaces = self.lock();
        let Some(right) = namespaces.get_mut(&task).and_then(|ns| ns.rights.get_mut(&name)) else {
            return false;
        };
        right.kind = RightType::DeadName;
        right.handle = None;
        true
    }

    /// Drop one user reference on `name`, removing it at zero.
    pub fn deallocate(&self, task: ProcessId, name: PortName) -> ShimResult<()>
    {
        let mut namespaces = self.lock();
        let namespace = namespaces
            .get_mut(&task)
            .ok_or_else(|| ShimError::InvalidArgument(format!("task {task} has no namespace")))?;
        let right = namespace
            .rights
            .get_mut(&name)
            .ok_or_else(|| ShimError::InvalidArgument(format!("name 0x{name:x} not in task {task}")))?;
        right.user_refs = right.user_refs.saturating_sub(1);
        if right.user_refs == 0 {
            namespace.rights.remove(&name);
        }
        Ok(())
    }

    /// User-reference count of `name`, if it exists.
    #[must_use]
    pub fn user_refs(&self, task: ProcessId, name: PortName) -> Option<u32>
    {
        self.lock()
            .get(&task)
            .and_then(|ns| ns.rights.get(&name))
            .map(|right| right.user_refs)
    }

    /// Destroy a task's namespace, releasing every reference it holds.
    pub fn destroy_namespace(&self, task: ProcessId)
    {
        if let Some(namespace) = self.lock().remove(&task) {
            debug!(%task, rights = namespace.rights.len(), "namespace destroyed");
        }
    }
}

impl RightRegistry for LocalRegistry
{
    fn get_right(&self, task: ProcessId, port: &PortRef, kind: RightType) -> ShimResult<PortName>
    {
        if kind == RightType::DeadName {
            return Err(ShimError::InvalidArgument("cannot create a dead-name right".to_string()));
        }

        let mut namespaces = self.lock();
        let namespace = namespaces.entry(task).or_default();
        if let Some(name) = namespace.find(port, kind) {
            if let Some(right) = namespace.rights.get_mut(&name) {
                right.user_refs = right.user_refs.saturating_add(1);
            }
            return Ok(name);
        }

        let name = namespace.allocate_name();
        namespace.rights.insert(
            name,
            Right {
                kind,
                handle: Some(PortHandle::acquire(port)),
                user_refs: 1,
            },
        );
        trace!(%task, name, ?kind, port = port.id(), "right created");
        Ok(name)
    }

    fn check_right(&self, task: ProcessId, name: PortName, filter: RightFilter) -> Option<CheckedRight>
    {
        if name == MACH_PORT_NULL {
            return None;
        }
        let namespaces = self.lock();
        let right = namespaces.get(&task)?.rights.get(&name)?;
        if !filter.accepts(right.kind) {
            return None;
        }
        Some(CheckedRight {
            name,
            kind: right.kind,
            port: right.handle.as_ref().map(|handle| handle.port().clone()),
        })
    }

    fn release_right(&self, task: ProcessId, name: PortName) -> ShimResult<()>
    {
        self.deallocate(task, name)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::{Port, PortKind};

    const TASK: ProcessId = ProcessId(100);

    #[test]
    fn test_get_right_reuses_existing_name()
    {
        let registry = LocalRegistry::new();
        let port = Port::new(PortKind::User);

        let first = registry.get_right(TASK, &port, RightType::Send).unwrap();
        let second = registry.get_right(TASK, &port, RightType::Send).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.user_refs(TASK, first), Some(2));
        // One namespace entry holds one port reference
        assert_eq!(port.ref_count(), 1);
    }

    #[test]
    fn test_check_right_filters_by_kind()
    {
        let registry = LocalRegistry::new();
        let port = Port::new(PortKind::User);
        let name = registry.insert(TASK, &port, RightType::Receive);

        assert!(registry.check_right(TASK, name, RightFilter::Send).is_none());
        let checked = registry.check_right(TASK, name, RightFilter::AllRights).unwrap();
        assert_eq!(checked.kind, RightType::Receive);
        assert!(Port::same(checked.port.as_ref().unwrap(), &port));
    }

    #[test]
    fn test_dead_name_keeps_name_drops_port()
    {
        let registry = LocalRegistry::new();
        let port = Port::new(PortKind::User);
        let name = registry.insert(TASK, &port, RightType::Send);
        assert_eq!(port.ref_count(), 1);

        assert!(registry.mark_dead(TASK, name));
        assert_eq!(port.ref_count(), 0);
        let checked = registry.check_right(TASK, name, RightFilter::AllRights).unwrap();
        assert_eq!(checked.kind, RightType::DeadName);
        assert!(checked.port.is_none());
    }

    #[test]
    fn test_names_are_per_task()
    {
        let registry = LocalRegistry::new();
        let port = Port::new(PortKind::User);
        let name = registry.insert(TASK, &port, RightType::Send);
        assert!(registry.check_right(ProcessId(101), name, RightFilter::AllRights).is_none());
    }

    #[test]
    fn test_deallocate_and_destroy_release_references()
    {
        let registry = LocalRegistry::new();
        let port = Port::new(PortKind::User);
        let name = registry.get_right(TASK, &port, RightType::Send).unwrap();
        registry.get_right(TASK, &port, RightType::Send).unwrap();

        registry.deallocate(TASK, name).unwrap();
        assert_eq!(port.ref_count(), 1);
        registry.destroy_namespace(TASK);
        assert_eq!(port.ref_count(), 0);
    }

    #[test]
    fn test_release_right_undoes_get_right()
    {
        let registry = LocalRegistry::new();
        let port = Port::new(PortKind::User);
        let name = registry.get_right(TASK, &port, RightType::Send).unwrap();
        registry.get_right(TASK, &port, RightType::Send).unwrap();

        registry.release_right(TASK, name).unwrap();
        assert_eq!(registry.user_refs(TASK, name), Some(1));
        registry.release_right(TASK, name).unwrap();
        assert_eq!(registry.user_refs(TASK, name), None);
        assert_eq!(port.ref_count(), 0);
    }

    #[test]
    fn test_null_name_never_resolves()
    {
        let registry = LocalRegistry::new();
        assert!(registry.check_right(TASK, MACH_PORT_NULL, RightFilter::AllRights).is_none());
    }
}
