//! Tests for the exception-port traps

mod common;

use common::Harness;
use machcompat_core::error::ShimError;
use machcompat_core::registry::RightType;
use machcompat_core::types::{Port, PortData};
use machcompat_protocol::{ExceptionMask, ExceptionType, TrapReply};

const BEHAVIOR_DEFAULT: i32 = 1;
const BEHAVIOR_STATE: i32 = 2;
const FLAVOR: i32 = 7;

fn entries(reply: TrapReply) -> Vec<machcompat_protocol::ExceptionPortEntry>
{
    match reply {
        TrapReply::ExceptionPorts(entries) => entries,
        other => panic!("expected exception ports, got {other:?}"),
    }
}

#[test]
fn test_set_updates_only_selected_slots()
{
    let harness = Harness::new();
    let ctx = harness.ctx();
    let (first, first_name) = harness.caller_port(RightType::Send);
    let (second, second_name) = harness.caller_port(RightType::Send);

    let mask = (ExceptionMask::BAD_ACCESS | ExceptionMask::BREAKPOINT).bits();
    harness
        .shim
        .task_set_exception_ports(&ctx, mask, first_name, BEHAVIOR_DEFAULT, FLAVOR)
        .unwrap();
    {
        let state = ctx.target.lock();
        assert_eq!(state.exceptions.len(), 2);
        assert!(state.exceptions.handler(ExceptionType::Software).is_none());
    }
    assert_eq!(first.ref_count(), 1 + 2);

    harness
        .shim
        .task_set_exception_ports(&ctx, ExceptionMask::BAD_ACCESS.bits(), second_name, BEHAVIOR_STATE, FLAVOR)
        .unwrap();
    assert_eq!(first.ref_count(), 1 + 1);
    assert_eq!(second.ref_count(), 1 + 1);

    let state = ctx.target.lock();
    assert!(Port::same(state.exceptions.handler(ExceptionType::BadAccess).unwrap(), &second));
    assert!(Port::same(state.exceptions.handler(ExceptionType::Breakpoint).unwrap(), &first));
}

#[test]
fn test_get_returns_mask_bits_and_parameters()
{
    let harness = Harness::new();
    let ctx = harness.ctx();
    let (first, first_name) = harness.caller_port(RightType::Send);
    let (_second, second_name) = harness.caller_port(RightType::Send);

    harness
        .shim
        .task_set_exception_ports(&ctx, ExceptionMask::BREAKPOINT.bits(), first_name, BEHAVIOR_DEFAULT, FLAVOR)
        .unwrap();
    harness
        .shim
        .task_set_exception_ports(&ctx, ExceptionMask::BAD_ACCESS.bits(), second_name, BEHAVIOR_STATE, 5)
        .unwrap();

    // The request mask does not filter
    let entries = entries(harness.shim.task_get_exception_ports(&ctx, 0).unwrap());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].mask, 1 << 1);
    assert_eq!(entries[0].port, second_name);
    assert_eq!((entries[0].behavior, entries[0].flavor), (BEHAVIOR_STATE, 5));
    assert_eq!(entries[1].mask, 1 << 6);
    assert!(Port::same(&harness.resolve(entries[1].port), &first));
    assert_eq!((entries[1].behavior, entries[1].flavor), (BEHAVIOR_DEFAULT, FLAVOR));
}

#[test]
fn test_unknown_categories_are_accepted_silently()
{
    let harness = Harness::new();
    let ctx = harness.ctx();
    let (_port, name) = harness.caller_port(RightType::Send);

    let mask = ExceptionMask::SOFTWARE.bits() | 1 << 15;
    let reply = harness.shim.task_set_exception_ports(&ctx, mask, name, BEHAVIOR_DEFAULT, FLAVOR).unwrap();
    assert_eq!(reply, TrapReply::Retval(0));
    assert_eq!(ctx.target.lock().exceptions.len(), 1);
}

#[test]
fn test_set_requires_live_send_right()
{
    let harness = Harness::new();
    let ctx = harness.ctx();
    let (_port, receive) = harness.caller_port(RightType::Receive);

    let err = harness
        .shim
        .task_set_exception_ports(&ctx, ExceptionMask::all().bits(), receive, BEHAVIOR_DEFAULT, FLAVOR)
        .unwrap_err();
    assert!(matches!(err, ShimError::PermissionDenied(_)));
    assert!(ctx.target.lock().exceptions.is_empty());
}

#[test]
fn test_handlers_with_foreign_data_are_skipped()
{
    let harness = Harness::new();
    let ctx = harness.ctx();
    let (port, name) = harness.caller_port(RightType::Send);
    harness
        .shim
        .task_set_exception_ports(&ctx, ExceptionMask::ARITHMETIC.bits(), name, BEHAVIOR_DEFAULT, FLAVOR)
        .unwrap();

    *port.data() = PortData::Other("semaphore");
    let entries = entries(harness.shim.task_get_exception_ports(&ctx, !0).unwrap());
    assert!(entries.is_empty());
}

#[test]
fn test_reply_is_capped_by_config()
{
    use std::sync::Arc;

    use machcompat_core::config::ShimConfig;
    use machcompat_core::ool::LocalOolArena;
    use machcompat_core::registry::LocalRegistry;
    use machcompat_core::Shim;

    let registry = Arc::new(LocalRegistry::new());
    let host = Arc::new(common::FakeHost::default());
    host.add_process(common::CALLER, 501, 501);
    host.add_process(common::TARGET, 501, 501);
    let config = ShimConfig {
        max_exception_ports: 2,
        ..ShimConfig::default()
    };
    let shim = Shim::with_config(registry.clone(), Arc::new(LocalOolArena::new()), host, config);
    shim.register_task(common::CALLER);
    shim.register_task(common::TARGET);
    let ctx = shim.context(common::CALLER, common::TARGET).unwrap();

    let port = Port::new(machcompat_core::types::PortKind::User);
    let name = registry.insert(common::CALLER, &port, RightType::Send);
    shim.task_set_exception_ports(&ctx, ExceptionMask::all().bits(), name, BEHAVIOR_DEFAULT, FLAVOR)
        .unwrap();

    assert_eq!(entries(shim.task_get_exception_ports(&ctx, 0).unwrap()).len(), 2);
}
