//! # Out-of-Line Transfer
//!
//! Traps that return port arrays (`mach_ports_lookup`, `task_threads`) do not
//! inline the array in the reply. The array is serialized to bytes and copied
//! into the caller's address space; the reply carries only the address.
//!
//! The copy mechanism is an external collaborator behind [`OolTransfer`].
//! [`LocalOolArena`] keeps the copies in process memory and hands out
//! page-aligned synthetic addresses, which is all the CLI and tests need.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use machcompat_protocol::descriptor::PORT_NAME_SIZE;
use machcompat_protocol::PortName;
use tracing::trace;

use crate::error::{ShimError, ShimResult};
use crate::types::ProcessId;

/// Copies a byte buffer into a task's address space.
pub trait OolTransfer: Send + Sync
{
    /// Copy `data` out to `task`, returning the address it landed at.
    ///
    /// On failure nothing has been mapped; the trap fails with the error and
    /// `data` is dropped.
    fn copyout(&self, task: ProcessId, data: Vec<u8>) -> ShimResult<u64>;

    /// Unmap a region whose reply never reached `task`, returning its bytes.
    fn reclaim(&self, task: ProcessId, address: u64) -> Option<Vec<u8>>;
}

/// Serialize port names the way they sit in an out-of-line array.
#[must_use]
pub fn encode_port_names(names: &[PortName]) -> Vec<u8>
{
    let mut bytes = Vec::with_capacity(names.len() * PORT_NAME_SIZE);
    for name in names {
        bytes.extend_from_slice(&name.to_ne_bytes());
    }
    bytes
}

/// Inverse of [`encode_port_names`]. Trailing partial names are ignored.
#[must_use]
pub fn decode_port_names(bytes: &[u8]) -> Vec<PortName>
{
    bytes
        .chunks_exact(PORT_NAME_SIZE)
        .map(|chunk| {
            let mut raw = [0u8; PORT_NAME_SIZE];
            raw.copy_from_slice(chunk);
            PortName::from_ne_bytes(raw)
        })
        .collect()
}

const ARENA_BASE: u64 = 0x7000_0000_0000;
const PAGE_SIZE: u64 = 0x4000;

#[derive(Debug, Default)]
struct Arena
{
    next: u64,
    regions: BTreeMap<(ProcessId, u64), Vec<u8>>,
}

/// In-process out-of-line arena.
#[derive(Debug, Default)]
pub struct LocalOolArena
{
    inner: Mutex<Arena>,
}

impl LocalOolArena
{
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arena>
    {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes copied out to `task` at `address`.
    #[must_use]
    pub fn read(&self, task: ProcessId, address: u64) -> Option<Vec<u8>>
    {
        self.lock().regions.get(&(task, address)).cloned()
    }

    /// Free a region (the receiver's `vm_deallocate`).
    pub fn release(&self, task: ProcessId, address: u64) -> bool
    {
        self.lock().regions.remove(&(task, address)).is_some()
    }

    /// Number of live regions across all tasks.
    #[must_use]
    pub fn regions(&self) -> usize
    {
        self.lock().regions.len()
    }
}

impl OolTransfer for LocalOolArena
{
    fn copyout(&self, task: ProcessId, data: Vec<u8>) -> ShimResult<u64>
    {
        let mut arena = self.lock();
        let pages = (data.len() as u64).div_ceil(PAGE_SIZE).max(1);
        let address = ARENA_BASE
            .checked_add(arena.next.saturating_mul(PAGE_SIZE))
            .ok_or(ShimError::Host {
                operation: "ool copyout",
                errno: libc::ENOMEM,
            })?;
        arena.next += pages;
        trace!(%task, address = format_args!("0x{address:x}"), len = data.len(), "ool region copied out");
        arena.regions.insert((task, address), data);
        Ok(address)
    }

    fn reclaim(&self, task: ProcessId, address: u64) -> Option<Vec<u8>>
    {
        self.lock().regions.remove(&(task, address))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_port_names_serialize_as_native_words()
    {
        let bytes = encode_port_names(&[0x103, 0x207]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_port_names(&bytes), vec![0x103, 0x207]);
    }

    #[test]
    fn test_arena_addresses_are_page_aligned_and_distinct()
    {
        let arena = LocalOolArena::new();
        let task = ProcessId(7);
        let a = arena.copyout(task, vec![1; 10]).unwrap();
        let b = arena.copyout(task, vec![2; PAGE_SIZE as usize + 1]).unwrap();
        let c = arena.copyout(task, Vec::new()).unwrap();

        assert_eq!(a % PAGE_SIZE, 0);
        assert_eq!(b, a + PAGE_SIZE);
        assert_eq!(c, b + 2 * PAGE_SIZE);
        assert_eq!(arena.read(task, a), Some(vec![1; 10]));
    }

    #[test]
    fn test_release_forgets_region()
    {
        let arena = LocalOolArena::new();
        let task = ProcessId(7);
        let address = arena.copyout(task, vec![0; 4]).unwrap();
        assert!(arena.release(task, address));
        assert!(!arena.release(task, address));
        assert_eq!(arena.regions(), 0);
    }
}
