//! # Exception Handler Table
//!
//! Each task binds at most one handler port per exception category. The table
//! owns one Mach reference per bound slot through a [`PortHandle`]; rebinding
//! a slot releases the previous handler before the new one is acquired.
//!
//! Handler parameters (behavior and thread-state flavor) are not stored in the
//! table. They live in the handler port's attached data as
//! [`PortData::ExceptionInfo`], so a port rebound with new parameters updates
//! every category it serves.

use machcompat_protocol::exception::EXC_MAX;
use machcompat_protocol::{ExceptionMask, ExceptionType};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::types::{ExceptionInfo, PortData, PortHandle, PortRef};

/// A handler bound to one category.
#[derive(Debug, Clone)]
pub struct BoundHandler
{
    /// Category the handler serves
    pub exception: ExceptionType,
    /// Handler port
    pub port: PortRef,
    /// Parameters read from the port's attached data
    pub info: ExceptionInfo,
}

/// Per-task table of exception handler ports, indexed by category.
///
/// Slot 0 never holds a handler; valid categories are `1..=EXC_MAX`.
#[derive(Debug, Default)]
pub struct ExceptionTable
{
    slots: [Option<PortHandle>; EXC_MAX + 1],
}

impl ExceptionTable
{
    /// Create a table with no handlers bound.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Handler port bound to `exception`, if any.
    #[must_use]
    pub fn handler(&self, exception: ExceptionType) -> Option<&PortRef>
    {
        self.slots[exception.raw() as usize].as_ref().map(PortHandle::port)
    }

    /// Every bound handler, in category order.
    ///
    /// A bound port whose attached data is not exception info belongs to some
    /// other subsystem now; it is skipped with a warning.
    #[must_use]
    pub fn get(&self) -> SmallVec<[BoundHandler; EXC_MAX]>
    {
        let mut handlers = SmallVec::new();
        for exception in ExceptionType::ALL {
            let Some(port) = self.handler(exception) else {
                continue;
            };
            let info = match &*port.data() {
                PortData::ExceptionInfo(info) => *info,
                other => {
                    warn!(?exception, port = port.id(), data = ?other, "exception handler has foreign port data");
                    continue;
                }
            };
            handlers.push(BoundHandler {
                exception,
                port: port.clone(),
                info,
            });
        }
        handlers
    }

    /// Bind `port` to every category in `mask`.
    ///
    /// Each selected slot drops its previous handler and takes a fresh
    /// reference on `port`. Bits outside the known categories are ignored.
    /// Returns how many slots were bound.
    pub fn set(&mut self, mask: ExceptionMask, port: &PortRef) -> usize
    {
        let unknown = mask.unknown_bits();
        if unknown != 0 {
            warn!(unknown = format_args!("0x{unknown:x}"), "ignoring unknown exception mask bits");
        }

        let mut bound = 0;
        for exception in mask.categories() {
            let slot = &mut self.slots[exception.raw() as usize];
            // Release first: the slot never holds two references at once
            drop(slot.take());
            *slot = Some(PortHandle::acquire(port));
            bound += 1;
            trace!(?exception, port = port.id(), "exception handler bound");
        }
        bound
    }

    /// Unbind every handler.
    pub fn clear(&mut self)
    {
        for slot in &mut self.slots {
            drop(slot.take());
        }
    }

    /// Number of bound categories.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no category is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::{Port, PortKind};

    fn handler_port(behavior: i32) -> PortRef
    {
        let port = Port::new(PortKind::User);
        *port.data() = PortData::ExceptionInfo(ExceptionInfo { flavor: 7, behavior });
        port
    }

    #[test]
    fn test_set_binds_selected_categories()
    {
        let mut table = ExceptionTable::new();
        let port = handler_port(1);
        let bound = table.set(ExceptionMask::BREAKPOINT | ExceptionMask::BAD_ACCESS, &port);

        assert_eq!(bound, 2);
        assert_eq!(port.ref_count(), 2);
        let handlers = table.get();
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].exception, ExceptionType::BadAccess);
        assert_eq!(handlers[1].exception, ExceptionType::Breakpoint);
        assert_eq!(handlers[1].info.behavior, 1);
    }

    #[test]
    fn test_rebinding_releases_previous_handler()
    {
        let mut table = ExceptionTable::new();
        let first = handler_port(1);
        let second = handler_port(2);

        table.set(ExceptionMask::BREAKPOINT, &first);
        table.set(ExceptionMask::BREAKPOINT, &second);
        assert_eq!(first.ref_count(), 0);
        assert_eq!(second.ref_count(), 1);
        assert!(Port::same(table.handler(ExceptionType::Breakpoint).unwrap(), &second));
    }

    #[test]
    fn test_unknown_bits_are_ignored()
    {
        let mut table = ExceptionTable::new();
        let port = handler_port(1);
        let bound = table.set(ExceptionMask::from_bits_retain(1 | 1 << 20), &port);
        assert_eq!(bound, 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_foreign_port_data_is_skipped()
    {
        let mut table = ExceptionTable::new();
        let port = handler_port(1);
        table.set(ExceptionMask::SOFTWARE, &port);
        *port.data() = PortData::Other("semaphore");

        assert!(table.get().is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clear_releases_everything()
    {
        let mut table = ExceptionTable::new();
        let port = handler_port(1);
        table.set(ExceptionMask::all(), &port);
        assert_eq!(port.ref_count(), EXC_MAX);
        table.clear();
        assert_eq!(port.ref_count(), 0);
    }
}
