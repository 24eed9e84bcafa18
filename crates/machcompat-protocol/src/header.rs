//! # Message Header, NDR Record and Trailer
//!
//! Every trap message starts with a Mach message header and every reply ends
//! with a trailer that is *not* counted in the header's declared size.
//!
//! ```text
//! +-----------+------+-------------+------------+--------------+------+
//! | bits      | size | remote_port | local_port | voucher_port | id   |
//! +-----------+------+-------------+------------+--------------+------+
//!   u32         u32    u32           u32          u32            i32
//! ```
//!
//! ## References
//!
//! - `osfmk/mach/message.h` in XNU for the header and trailer layouts
//! - `osfmk/mach/ndr.h` for the NDR record

use static_assertions::const_assert_eq;

use crate::wire::{WireError, WireReader, WireWriter};
use crate::PortName;

/// Size of [`MsgHeader`] on the wire.
pub const MSG_HEADER_SIZE: usize = 24;

/// Size of the NDR record that precedes inline data.
pub const NDR_RECORD_SIZE: usize = 8;

/// Size of the complex-message body (descriptor count).
pub const MSG_BODY_SIZE: usize = 4;

/// Size of the format-0 trailer appended after every reply.
pub const MSG_TRAILER_SIZE: usize = 8;

const_assert_eq!(MSG_HEADER_SIZE, 6 * 4);

/// `MACH_MSGH_BITS_COMPLEX`: the message carries descriptors.
pub const MACH_MSGH_BITS_COMPLEX: u32 = 0x8000_0000;

/// Mask for the remote-port disposition in `msgh_bits`.
pub const MACH_MSGH_BITS_REMOTE_MASK: u32 = 0x0000_00ff;

/// `MACH_MSG_TYPE_MOVE_SEND`
pub const MACH_MSG_TYPE_MOVE_SEND: u8 = 17;

/// `MACH_MSG_TYPE_MOVE_SEND_ONCE`
pub const MACH_MSG_TYPE_MOVE_SEND_ONCE: u8 = 18;

/// MIG replies carry the request id plus this offset.
pub const REPLY_ID_OFFSET: i32 = 100;

/// `MACH_MSG_TRAILER_FORMAT_0`
pub const MACH_MSG_TRAILER_FORMAT_0: u32 = 0;

/// The NDR record every MIG message carries for little/big-endian negotiation.
///
/// `{mig_vers, if_vers, reserved1, mig_encoding, int_rep, char_rep,
/// float_rep, reserved2}` with `int_rep = 1` (little endian host).
pub const NDR_RECORD: [u8; NDR_RECORD_SIZE] = [0, 0, 0, 0, 1, 0, 0, 0];

/// Mach message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgHeader
{
    /// Port dispositions and the complex flag.
    pub bits: u32,
    /// Declared length in bytes, trailer excluded.
    pub size: u32,
    /// Destination port (for replies: the request's reply port).
    pub remote_port: PortName,
    /// Reply port supplied by the sender.
    pub local_port: PortName,
    /// Voucher port, always null here.
    pub voucher_port: PortName,
    /// Message id selecting the routine.
    pub id: i32,
}

impl MsgHeader
{
    /// Decode a header from the start of a request.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, WireError>
    {
        Ok(Self {
            bits: reader.u32()?,
            size: reader.u32()?,
            remote_port: reader.u32()?,
            local_port: reader.u32()?,
            voucher_port: reader.u32()?,
            id: reader.i32()?,
        })
    }

    /// Encode the header.
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<(), WireError>
    {
        writer.u32(self.bits)?;
        writer.u32(self.size)?;
        writer.u32(self.remote_port)?;
        writer.u32(self.local_port)?;
        writer.u32(self.voucher_port)?;
        writer.i32(self.id)
    }

    /// Build the header of a reply to `self`.
    ///
    /// The reply goes back through the request's reply port with a send-once
    /// disposition; `size` is the exact byte length of the reply body.
    #[must_use]
    pub fn reply(&self, size: usize, complex: bool) -> Self
    {
        let mut bits = u32::from(MACH_MSG_TYPE_MOVE_SEND_ONCE) & MACH_MSGH_BITS_REMOTE_MASK;
        if complex {
            bits |= MACH_MSGH_BITS_COMPLEX;
        }
        Self {
            bits,
            size: u32::try_from(size).unwrap_or(u32::MAX),
            remote_port: self.local_port,
            local_port: 0,
            voucher_port: 0,
            id: self.id.wrapping_add(REPLY_ID_OFFSET),
        }
    }

    /// Whether the message declares descriptors.
    #[must_use]
    pub fn is_complex(&self) -> bool
    {
        self.bits & MACH_MSGH_BITS_COMPLEX != 0
    }
}

/// Write the NDR record.
pub fn encode_ndr(writer: &mut WireWriter<'_>) -> Result<(), WireError>
{
    writer.bytes(&NDR_RECORD)
}

/// Skip an NDR record in a request.
pub fn skip_ndr(reader: &mut WireReader<'_>) -> Result<(), WireError>
{
    reader.skip(NDR_RECORD_SIZE)
}

/// Write the format-0 trailer.
pub fn encode_trailer(writer: &mut WireWriter<'_>) -> Result<(), WireError>
{
    writer.u32(MACH_MSG_TRAILER_FORMAT_0)?;
    writer.u32(MSG_TRAILER_SIZE as u32)
}
