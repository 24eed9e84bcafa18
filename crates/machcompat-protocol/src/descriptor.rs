//! Port and out-of-line port-array descriptors.

use crate::header::MACH_MSG_TYPE_MOVE_SEND;
use crate::wire::{WireError, WireReader, WireWriter};
use crate::PortName;

/// `MACH_MSG_PORT_DESCRIPTOR`
pub const MACH_MSG_PORT_DESCRIPTOR: u8 = 0;

/// `MACH_MSG_OOL_PORTS_DESCRIPTOR`
pub const MACH_MSG_OOL_PORTS_DESCRIPTOR: u8 = 2;

/// `MACH_MSG_ALLOCATE`: the receiver owns a freshly mapped copy.
pub const MACH_MSG_ALLOCATE: u8 = 2;

/// Size of a port descriptor on the wire.
pub const PORT_DESCRIPTOR_SIZE: usize = 12;

/// Size of a 64-bit out-of-line ports descriptor on the wire.
pub const OOL_PORTS_DESCRIPTOR_SIZE: usize = 16;

/// Size of one port name inside an out-of-line array.
pub const PORT_NAME_SIZE: usize = std::mem::size_of::<PortName>();

/// A single port right carried inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor
{
    /// Name of the right in the receiver's namespace.
    pub name: PortName,
    /// Transfer disposition.
    pub disposition: u8,
}

impl PortDescriptor
{
    /// A send right moved to the receiver.
    #[must_use]
    pub fn move_send(name: PortName) -> Self
    {
        Self {
            name,
            disposition: MACH_MSG_TYPE_MOVE_SEND,
        }
    }

    /// Decode a descriptor, rejecting any other descriptor type.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError>
    {
        let name = reader.u32()?;
        let _pad1 = reader.u32()?;
        let _pad2 = reader.u16()?;
        let disposition = reader.u8()?;
        let kind = reader.u8()?;
        if kind != MACH_MSG_PORT_DESCRIPTOR {
            return Err(WireError::UnexpectedDescriptor {
                expected: MACH_MSG_PORT_DESCRIPTOR,
                found: kind,
            });
        }
        Ok(Self { name, disposition })
    }

    /// Encode the descriptor.
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError>
    {
        writer.u32(self.name)?;
        writer.u32(0)?;
        writer.u16(0)?;
        writer.u8(self.disposition)?;
        writer.u8(MACH_MSG_PORT_DESCRIPTOR)
    }
}

/// An array of port names copied into the receiver's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OolPortsDescriptor
{
    /// Address of the array in the receiver's address space.
    pub address: u64,
    /// Number of names in the array.
    pub count: u32,
}

impl OolPortsDescriptor
{
    /// Length in bytes of the array this descriptor points at.
    #[must_use]
    pub fn byte_len(&self) -> usize
    {
        self.count as usize * PORT_NAME_SIZE
    }

    /// Decode a descriptor, rejecting any other descriptor type.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError>
    {
        let address = reader.u64()?;
        let _deallocate = reader.u8()?;
        let _copy = reader.u8()?;
        let _disposition = reader.u8()?;
        let kind = reader.u8()?;
        if kind != MACH_MSG_OOL_PORTS_DESCRIPTOR {
            return Err(WireError::UnexpectedDescriptor {
                expected: MACH_MSG_OOL_PORTS_DESCRIPTOR,
                found: kind,
            });
        }
        let count = reader.u32()?;
        Ok(Self { address, count })
    }

    /// Encode the descriptor.
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError>
    {
        writer.u64(self.address)?;
        writer.u8(0)?;
        writer.u8(MACH_MSG_ALLOCATE)?;
        writer.u8(MACH_MSG_TYPE_MOVE_SEND)?;
        writer.u8(MACH_MSG_OOL_PORTS_DESCRIPTOR)?;
        writer.u32(self.count)
    }
}
