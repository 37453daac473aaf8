//! # Device Registry Tests
//!
//! Id assignment, dispatch by device field, and per-step ticking.

use cosim_harness::SimError;
use cosim_harness::htif::{Command, DeviceList};
use cosim_harness::mem::SparseMemory;

use crate::common::mocks::device::{MockHtifDevice, RecordingDevice};

#[test]
fn test_ids_follow_registration_order() {
    let mut devices = DeviceList::new();
    assert!(devices.is_empty());
    let (a, _) = RecordingDevice::new(true);
    let (b, _) = RecordingDevice::new(true);
    assert_eq!(devices.register(Box::new(a)).unwrap(), 0);
    assert_eq!(devices.register(Box::new(b)).unwrap(), 1);
    assert_eq!(devices.len(), 2);
}

#[test]
fn test_registry_rejects_device_past_last_id() {
    let mut devices = DeviceList::new();
    for expected in 0..=255u8 {
        let (dev, _) = RecordingDevice::new(false);
        assert_eq!(devices.register(Box::new(dev)).unwrap(), expected);
    }

    let (extra, _) = RecordingDevice::new(false);
    assert!(matches!(
        devices.register(Box::new(extra)),
        Err(SimError::DeviceTableFull { name: "recorder" })
    ));
    assert_eq!(devices.len(), 256);
}

#[test]
fn test_dispatch_by_device_field() {
    let mut mem = SparseMemory::new();
    let mut devices = DeviceList::new();
    let (first, first_log) = RecordingDevice::new(true);
    let (second, second_log) = RecordingDevice::new(false);
    let _ = devices.register(Box::new(first)).unwrap();
    let _ = devices.register(Box::new(second)).unwrap();

    let reply = devices
        .handle_command(&Command::new(0, 0, 10), &mut mem)
        .unwrap();
    assert_eq!(reply, Some(11));

    let reply = devices
        .handle_command(&Command::new(1, 4, 20), &mut mem)
        .unwrap();
    assert_eq!(reply, None);

    assert_eq!(first_log.commands(), vec![Command::new(0, 0, 10)]);
    assert_eq!(second_log.commands(), vec![Command::new(1, 4, 20)]);
}

#[test]
fn test_unknown_device_is_ignored() {
    let mut mem = SparseMemory::new();
    let mut devices = DeviceList::new();
    let (dev, log) = RecordingDevice::new(true);
    let _ = devices.register(Box::new(dev)).unwrap();

    let reply = devices
        .handle_command(&Command::new(9, 0, 1), &mut mem)
        .unwrap();
    assert_eq!(reply, None);
    assert!(log.commands().is_empty());
}

#[test]
fn test_tick_reaches_every_device() {
    let mut devices = DeviceList::new();
    let (a, a_log) = RecordingDevice::new(true);
    let (b, b_log) = RecordingDevice::new(true);
    let _ = devices.register(Box::new(a)).unwrap();
    let _ = devices.register(Box::new(b)).unwrap();

    devices.tick();
    devices.tick();
    assert_eq!(a_log.ticks(), 2);
    assert_eq!(b_log.ticks(), 2);
}

#[test]
fn test_mock_device_sees_decoded_command() {
    let mut mem = SparseMemory::new();
    let mut mock = MockHtifDevice::new();
    let _ = mock.expect_name().return_const("mock");
    let _ = mock
        .expect_handle()
        .withf(|cmd, _| cmd.device() == 0 && cmd.cmd() == 1 && cmd.payload() == 0x55)
        .times(1)
        .returning(|_, _| Ok(Some(0x99)));
    let _ = mock.expect_tick().times(1).return_const(());

    let mut devices = DeviceList::new();
    let _ = devices.register(Box::new(mock)).unwrap();
    let reply = devices
        .handle_command(&Command::new(0, 1, 0x55), &mut mem)
        .unwrap();
    assert_eq!(reply, Some(0x99));
    devices.tick();
}
