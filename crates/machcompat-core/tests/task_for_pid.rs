//! Tests for task_for_pid authorization

mod common;

use common::{Harness, CALLER, TARGET, USER_UID};
use machcompat_core::error::ShimError;
use machcompat_core::registry::RightType;
use machcompat_core::task::SpecialPort;
use machcompat_core::types::{Port, ProcessId};

const OTHER_USER: ProcessId = ProcessId(300);

fn harness_with_other_user() -> Harness
{
    let harness = Harness::new();
    harness.host.add_process(OTHER_USER, USER_UID + 1, USER_UID + 1);
    harness.shim.register_task(OTHER_USER);
    harness
}

#[test]
fn test_same_user_is_allowed()
{
    let harness = Harness::new();
    let (_control, control) = harness.caller_port(RightType::Receive);

    let name = harness.shim.task_for_pid(CALLER, control, TARGET).unwrap();
    let target = harness.shim.task(TARGET).unwrap();
    let kernel = target.lock().special(SpecialPort::Kernel).unwrap().clone();
    assert!(Port::same(&harness.resolve(name), &kernel));
}

#[test]
fn test_other_user_is_denied()
{
    let harness = harness_with_other_user();
    let (_control, control) = harness.caller_port(RightType::Send);

    let err = harness.shim.task_for_pid(CALLER, control, OTHER_USER).unwrap_err();
    assert!(matches!(err, ShimError::PermissionDenied(_)));
    assert_eq!(err.errno(), libc::EPERM);
}

#[test]
fn test_privileged_caller_is_allowed()
{
    let harness = harness_with_other_user();
    let root = ProcessId(1);
    harness.host.add_process(root, 0, 0);
    harness.shim.register_task(root);
    let port = Port::new(machcompat_core::types::PortKind::User);
    let control = harness.registry.insert(root, &port, RightType::Send);

    assert!(harness.shim.task_for_pid(root, control, OTHER_USER).is_ok());
}

#[test]
fn test_control_name_must_exist()
{
    let harness = Harness::new();
    let err = harness.shim.task_for_pid(CALLER, 0x4403, TARGET).unwrap_err();
    assert!(matches!(err, ShimError::PermissionDenied(_)));

    // Dead names still pass the existence check
    let (_port, dead) = harness.caller_port(RightType::Send);
    harness.registry.mark_dead(CALLER, dead);
    assert!(harness.shim.task_for_pid(CALLER, dead, TARGET).is_ok());
}

#[test]
fn test_missing_process()
{
    let harness = Harness::new();
    let (_control, control) = harness.caller_port(RightType::Send);

    let err = harness.shim.task_for_pid(CALLER, control, ProcessId(4242)).unwrap_err();
    assert!(matches!(err, ShimError::ProcessNotFound(4242)));
}

#[test]
fn test_syscall_form_copies_out_name()
{
    let harness = harness_with_other_user();
    let (_control, control) = harness.caller_port(RightType::Send);

    let mut out = 0;
    assert_eq!(harness.shim.sys_task_for_pid(CALLER, control, TARGET.0 as i32, &mut out), 0);
    assert_ne!(out, 0);

    let mut untouched = 0;
    assert_eq!(
        harness.shim.sys_task_for_pid(CALLER, control, OTHER_USER.0 as i32, &mut untouched),
        1
    );
    assert_eq!(untouched, 0);
    assert_eq!(harness.shim.sys_task_for_pid(CALLER, control, -1, &mut untouched), 3);
}
