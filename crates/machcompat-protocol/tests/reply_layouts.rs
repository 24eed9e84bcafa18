//! Byte-level checks of the reply layouts a foreign caller decodes.

use machcompat_protocol::descriptor::{OolPortsDescriptor, PortDescriptor, MACH_MSG_OOL_PORTS_DESCRIPTOR};
use machcompat_protocol::header::{MsgHeader, MACH_MSGH_BITS_COMPLEX, MSG_TRAILER_SIZE, NDR_RECORD};
use machcompat_protocol::info::{TaskBasicInfo, TaskEventsInfo, TimeValue};
use machcompat_protocol::wire::WireReader;
use machcompat_protocol::{ExceptionPortEntry, Request, TaskInfoRecord, TrapId, TrapReply, TrapRequest, WireError};

fn request_header(trap: TrapId) -> MsgHeader
{
    MsgHeader {
        bits: 0x1513,
        size: 24,
        remote_port: 0x103,
        local_port: 0x2a07,
        voucher_port: 0,
        id: trap.msg_id(),
    }
}

fn encode(reply: &TrapReply, trap: TrapId) -> Vec<u8>
{
    let mut buf = vec![0u8; 256];
    let written = reply.encode(&request_header(trap), &mut buf).unwrap();
    assert_eq!(written, reply.encoded_len() + MSG_TRAILER_SIZE);
    buf.truncate(written);
    buf
}

#[test]
fn test_special_port_reply()
{
    let buf = encode(&TrapReply::SpecialPort(0x1303), TrapId::GetSpecialPort);
    assert_eq!(buf.len(), 40 + 8);

    let mut reader = WireReader::new(&buf);
    let header = MsgHeader::decode(&mut reader).unwrap();
    assert_eq!(header.size, 40);
    assert_eq!(header.id, 3509);
    assert!(header.is_complex());
    assert_eq!(reader.u32().unwrap(), 1);
    assert_eq!(PortDescriptor::decode(&mut reader).unwrap(), PortDescriptor::move_send(0x1303));
}

#[test]
fn test_ool_reply_carries_address_and_count()
{
    let reply = TrapReply::PortsLookup {
        ports: OolPortsDescriptor {
            address: 0x7000_0000_4000,
            count: 3,
        },
        count: 3,
    };
    let buf = encode(&reply, TrapId::PortsLookup);

    let mut reader = WireReader::new(&buf);
    let header = MsgHeader::decode(&mut reader).unwrap();
    assert_eq!(header.size, 56);
    assert_eq!(header.bits & MACH_MSGH_BITS_COMPLEX, MACH_MSGH_BITS_COMPLEX);
    assert_eq!(reader.u32().unwrap(), 1);
    let ool = OolPortsDescriptor::decode(&mut reader).unwrap();
    assert_eq!(ool.address, 0x7000_0000_4000);
    assert_eq!(ool.count, 3);
    assert_eq!(buf[reader.position() - 5], MACH_MSG_OOL_PORTS_DESCRIPTOR);
    reader.skip(NDR_RECORD.len()).unwrap();
    assert_eq!(reader.u32().unwrap(), 3);
}

#[test]
fn test_exception_ports_reply_arrays()
{
    let entries = vec![
        ExceptionPortEntry {
            mask: 1 << 1,
            port: 0x503,
            behavior: 1,
            flavor: 7,
        },
        ExceptionPortEntry {
            mask: 1 << 6,
            port: 0x603,
            behavior: 2,
            flavor: 5,
        },
    ];
    let buf = encode(&TrapReply::ExceptionPorts(entries), TrapId::GetExceptionPorts);

    let mut reader = WireReader::new(&buf);
    let header = MsgHeader::decode(&mut reader).unwrap();
    assert_eq!(header.size, 40 + 48);
    assert_eq!(reader.u32().unwrap(), 2);
    assert_eq!(PortDescriptor::decode(&mut reader).unwrap().name, 0x503);
    assert_eq!(PortDescriptor::decode(&mut reader).unwrap().name, 0x603);
    reader.skip(NDR_RECORD.len()).unwrap();
    assert_eq!(reader.u32().unwrap(), 2);
    let arrays: Vec<u32> = (0..6).map(|_| reader.u32().unwrap()).collect();
    assert_eq!(arrays, vec![1 << 1, 1 << 6, 1, 2, 7, 5]);
}

#[test]
fn test_info_reply_fields()
{
    let info = TaskBasicInfo {
        suspend_count: 2,
        virtual_size: 4096,
        resident_size: 8192,
        user_time: TimeValue {
            seconds: 3,
            microseconds: 250,
        },
        system_time: TimeValue::default(),
        policy: 1,
    };
    let buf = encode(&TrapReply::Info(TaskInfoRecord::Basic(info)), TrapId::Info);

    let mut reader = WireReader::new(&buf);
    let header = MsgHeader::decode(&mut reader).unwrap();
    assert_eq!(header.size, 80);
    assert!(!header.is_complex());
    reader.skip(NDR_RECORD.len()).unwrap();
    assert_eq!(reader.i32().unwrap(), 0);
    assert_eq!(reader.u32().unwrap(), TaskBasicInfo::COUNT);
    assert_eq!(reader.i32().unwrap(), 2);
    assert_eq!(reader.u32().unwrap(), 4096);
    assert_eq!(reader.u32().unwrap(), 8192);
    assert_eq!(reader.i32().unwrap(), 3);
    assert_eq!(reader.i32().unwrap(), 250);

    let events = TrapReply::Info(TaskInfoRecord::Events(TaskEventsInfo::default()));
    assert_eq!(events.encoded_len(), 72);
}

#[test]
fn test_requests_decode_what_callers_send()
{
    let request = Request {
        header: request_header(TrapId::SetExceptionPorts),
        trap: TrapId::SetExceptionPorts,
        body: TrapRequest::SetExceptionPorts {
            mask: 0x42,
            port: PortDescriptor::move_send(0x903),
            behavior: 1,
            flavor: 7,
        },
    };
    let mut buf = [0u8; 96];
    let len = request.encode(&mut buf).unwrap();
    let decoded = Request::decode(&buf[..len]).unwrap();
    assert!(decoded.header.is_complex());
    assert_eq!(decoded.body, request.body);

    // Wrong descriptor count in the body
    let mut tampered = buf;
    tampered[24..28].copy_from_slice(&2u32.to_ne_bytes());
    assert_eq!(
        Request::decode(&tampered[..len]),
        Err(WireError::DescriptorCount { expected: 1, found: 2 })
    );
}
