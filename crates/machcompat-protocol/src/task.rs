//! # Task Trap Schemas
//!
//! One request and one reply schema per routed trap. Requests are decoded
//! from the caller's buffer into [`TrapRequest`]; replies are built as
//! [`TrapReply`] values and serialized with an exact declared length followed
//! by the trailer.
//!
//! ## Reply layouts
//!
//! | Reply | Layout | Bytes |
//! |---|---|---|
//! | `Retval` | header, NDR, retval | 36 |
//! | `SpecialPort` | header, body, port descriptor | 40 |
//! | `PortsLookup` / `Threads` | header, body, OOL ports descriptor, NDR, count | 56 |
//! | `ExceptionPorts` | header, body, n port descriptors, NDR, n, masks\[n\], behaviors\[n\], flavors\[n\] | 40 + 24n |
//! | `Info` | header, NDR, retval, count, record | 40 + record |

use crate::descriptor::{OolPortsDescriptor, PortDescriptor, OOL_PORTS_DESCRIPTOR_SIZE, PORT_DESCRIPTOR_SIZE};
use crate::header::{
    encode_ndr, encode_trailer, skip_ndr, MsgHeader, MSG_BODY_SIZE, MSG_HEADER_SIZE, MSG_TRAILER_SIZE, NDR_RECORD_SIZE,
};
use crate::ids::TrapId;
use crate::info::TaskInfoRecord;
use crate::wire::{WireError, WireReader, WireWriter};
use crate::PortName;

/// A decoded request: header plus trap-specific body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request
{
    /// Request header.
    pub header: MsgHeader,
    /// Trap selected by `header.id`.
    pub trap: TrapId,
    /// Trap-specific fields.
    pub body: TrapRequest,
}

/// Trap-specific request fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapRequest
{
    /// No fields beyond the header.
    Empty,
    /// `task_get_special_port`
    GetSpecialPort
    {
        /// Port selector.
        which: i32,
    },
    /// `task_set_special_port`
    SetSpecialPort
    {
        /// Port selector.
        which: i32,
        /// Right to install.
        port: PortDescriptor,
    },
    /// `task_info`
    Info
    {
        /// Requested flavor.
        flavor: i32,
        /// Caller capacity in info units.
        count: u32,
    },
    /// `task_get_exception_ports`
    GetExceptionPorts
    {
        /// Categories of interest.
        mask: u32,
    },
    /// `task_set_exception_ports`
    SetExceptionPorts
    {
        /// Categories to bind.
        mask: u32,
        /// Handler right.
        port: PortDescriptor,
        /// Exception behavior.
        behavior: i32,
        /// Thread state flavor.
        flavor: i32,
    },
}

fn expect_descriptors(reader: &mut WireReader<'_>, expected: u32) -> Result<(), WireError>
{
    let found = reader.u32()?;
    if found != expected {
        return Err(WireError::DescriptorCount { expected, found });
    }
    Ok(())
}

impl Request
{
    /// Decode a request buffer.
    ///
    /// ## Errors
    ///
    /// - `Truncated`: the declared message ends before a required field
    /// - `SizeMismatch`: the header declares more bytes than were supplied
    /// - `UnknownMessage`: the id does not name a routed trap
    /// - `UnexpectedDescriptor` / `DescriptorCount`: malformed complex body
    pub fn decode(buf: &[u8]) -> Result<Self, WireError>
    {
        let header = MsgHeader::decode(&mut WireReader::new(buf))?;
        let declared = header.size as usize;
        if declared > buf.len() {
            return Err(WireError::SizeMismatch {
                declared: header.size,
                available: buf.len(),
            });
        }
        // The body ends where the header says, not where the buffer does
        let mut reader = WireReader::new(&buf[..declared]);
        reader.skip(MSG_HEADER_SIZE)?;
        let trap = TrapId::try_from(header.id)?;

        let body = match trap {
            TrapId::GetSpecialPort => {
                skip_ndr(&mut reader)?;
                TrapRequest::GetSpecialPort { which: reader.i32()? }
            }
            TrapId::SetSpecialPort => {
                expect_descriptors(&mut reader, 1)?;
                let port = PortDescriptor::decode(&mut reader)?;
                skip_ndr(&mut reader)?;
                TrapRequest::SetSpecialPort {
                    which: reader.i32()?,
                    port,
                }
            }
            TrapId::Info => {
                skip_ndr(&mut reader)?;
                TrapRequest::Info {
                    flavor: reader.i32()?,
                    count: reader.u32()?,
                }
            }
            TrapId::GetExceptionPorts => {
                skip_ndr(&mut reader)?;
                TrapRequest::GetExceptionPorts { mask: reader.u32()? }
            }
            TrapId::SetExceptionPorts => {
                expect_descriptors(&mut reader, 1)?;
                let port = PortDescriptor::decode(&mut reader)?;
                skip_ndr(&mut reader)?;
                TrapRequest::SetExceptionPorts {
                    mask: reader.u32()?,
                    port,
                    behavior: reader.i32()?,
                    flavor: reader.i32()?,
                }
            }
            TrapId::Terminate
            | TrapId::Threads
            | TrapId::PortsLookup
            | TrapId::Suspend
            | TrapId::Resume
            | TrapId::ThreadCreate
            | TrapId::ThreadCreateRunning => TrapRequest::Empty,
        };

        Ok(Self { header, trap, body })
    }

    /// Encode a request (used by callers and tests that build traps).
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError>
    {
        let len = self.body.encoded_len();
        let mut writer = WireWriter::new(buf);
        writer.reserve(len)?;
        let mut header = self.header;
        header.size = u32::try_from(len).unwrap_or(u32::MAX);
        header.id = self.trap.msg_id();
        if self.body.is_complex() {
            header.bits |= crate::header::MACH_MSGH_BITS_COMPLEX;
        }
        header.encode(&mut writer)?;
        self.body.encode(&mut writer)?;
        Ok(writer.position())
    }
}

impl TrapRequest
{
    fn is_complex(&self) -> bool
    {
        matches!(self, Self::SetSpecialPort { .. } | Self::SetExceptionPorts { .. })
    }

    fn encoded_len(&self) -> usize
    {
        MSG_HEADER_SIZE
            + match self {
                Self::Empty => 0,
                Self::GetSpecialPort { .. } | Self::GetExceptionPorts { .. } => NDR_RECORD_SIZE + 4,
                Self::Info { .. } => NDR_RECORD_SIZE + 8,
                Self::SetSpecialPort { .. } => MSG_BODY_SIZE + PORT_DESCRIPTOR_SIZE + NDR_RECORD_SIZE + 4,
                Self::SetExceptionPorts { .. } => MSG_BODY_SIZE + PORT_DESCRIPTOR_SIZE + NDR_RECORD_SIZE + 12,
            }
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError>
    {
        match self {
            Self::Empty => Ok(()),
            Self::GetSpecialPort { which } => {
                encode_ndr(writer)?;
                writer.i32(*which)
            }
            Self::SetSpecialPort { which, port } => {
                writer.u32(1)?;
                port.encode(writer)?;
                encode_ndr(writer)?;
                writer.i32(*which)
            }
            Self::Info { flavor, count } => {
                encode_ndr(writer)?;
                writer.i32(*flavor)?;
                writer.u32(*count)
            }
            Self::GetExceptionPorts { mask } => {
                encode_ndr(writer)?;
                writer.u32(*mask)
            }
            Self::SetExceptionPorts {
                mask,
                port,
                behavior,
                flavor,
            } => {
                writer.u32(1)?;
                port.encode(writer)?;
                encode_ndr(writer)?;
                writer.u32(*mask)?;
                writer.i32(*behavior)?;
                writer.i32(*flavor)
            }
        }
    }
}

/// One bound exception handler in a `task_get_exception_ports` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionPortEntry
{
    /// Mask bit of the category (not the category index).
    pub mask: u32,
    /// Send right to the handler in the caller's namespace.
    pub port: PortName,
    /// Behavior registered with the handler.
    pub behavior: i32,
    /// Thread-state flavor registered with the handler.
    pub flavor: i32,
}

/// Trap-specific reply body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapReply
{
    /// A bare return code. Also the shared error encoding.
    Retval(i32),
    /// `task_get_special_port`
    SpecialPort(PortName),
    /// `mach_ports_lookup`
    PortsLookup
    {
        /// Out-of-line port array.
        ports: OolPortsDescriptor,
        /// `init_port_set_count` reported to the caller.
        count: u32,
    },
    /// `task_threads`
    Threads
    {
        /// Out-of-line thread port array.
        threads: OolPortsDescriptor,
        /// Number of threads at snapshot time.
        count: u32,
    },
    /// `task_get_exception_ports`
    ///
    /// The encoded count is the number of entries. It is not padded up to the
    /// fixed 32-slot array size that some Mach emulations always report.
    ExceptionPorts(Vec<ExceptionPortEntry>),
    /// `task_info`
    Info(TaskInfoRecord),
}

impl TrapReply
{
    /// Whether the reply carries descriptors.
    #[must_use]
    pub fn is_complex(&self) -> bool
    {
        matches!(
            self,
            Self::SpecialPort(_) | Self::PortsLookup { .. } | Self::Threads { .. } | Self::ExceptionPorts(_)
        )
    }

    /// Exact declared length of the reply (trailer excluded).
    #[must_use]
    pub fn encoded_len(&self) -> usize
    {
        MSG_HEADER_SIZE
            + match self {
                Self::Retval(_) => NDR_RECORD_SIZE + 4,
                Self::SpecialPort(_) => MSG_BODY_SIZE + PORT_DESCRIPTOR_SIZE,
                Self::PortsLookup { .. } | Self::Threads { .. } => {
                    MSG_BODY_SIZE + OOL_PORTS_DESCRIPTOR_SIZE + NDR_RECORD_SIZE + 4
                }
                Self::ExceptionPorts(entries) => {
                    MSG_BODY_SIZE + entries.len() * PORT_DESCRIPTOR_SIZE + NDR_RECORD_SIZE + 4 + entries.len() * 12
                }
                Self::Info(record) => NDR_RECORD_SIZE + 4 + 4 + record.byte_len(),
            }
    }

    /// Serialize the reply to `request` into `buf`, trailer included.
    ///
    /// Returns the total number of bytes written. When the buffer cannot hold
    /// the reply and trailer nothing is written.
    pub fn encode(&self, request: &MsgHeader, buf: &mut [u8]) -> Result<usize, WireError>
    {
        let len = self.encoded_len();
        let mut writer = WireWriter::new(buf);
        writer.reserve(len + MSG_TRAILER_SIZE)?;

        request.reply(len, self.is_complex()).encode(&mut writer)?;
        match self {
            Self::Retval(retval) => {
                encode_ndr(&mut writer)?;
                writer.i32(*retval)?;
            }
            Self::SpecialPort(name) => {
                writer.u32(1)?;
                PortDescriptor::move_send(*name).encode(&mut writer)?;
            }
            Self::PortsLookup { ports: ool, count } | Self::Threads { threads: ool, count } => {
                writer.u32(1)?;
                ool.encode(&mut writer)?;
                encode_ndr(&mut writer)?;
                writer.u32(*count)?;
            }
            Self::ExceptionPorts(entries) => {
                let n = u32::try_from(entries.len()).unwrap_or(u32::MAX);
                writer.u32(n)?;
                for entry in entries {
                    PortDescriptor::move_send(entry.port).encode(&mut writer)?;
                }
                encode_ndr(&mut writer)?;
                writer.u32(n)?;
                for entry in entries {
                    writer.u32(entry.mask)?;
                }
                for entry in entries {
                    writer.i32(entry.behavior)?;
                }
                for entry in entries {
                    writer.i32(entry.flavor)?;
                }
            }
            Self::Info(record) => {
                encode_ndr(&mut writer)?;
                writer.i32(0)?;
                writer.u32(record.count())?;
                record.encode(&mut writer)?;
            }
        }
        debug_assert_eq!(writer.position(), len);
        encode_trailer(&mut writer)?;
        Ok(writer.position())
    }
}
