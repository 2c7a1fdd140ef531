use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::Ordering;

use crate::driver::{AcceleratorDriver, StreamHandle};
use crate::error::Error;
use crate::guard::{DeviceGuard, StreamGuard};
use crate::test::mock::MockDriver;
use crate::topology::DeviceTopology;
use crate::{current_device, current_stream};

fn fixture(num_devices: i32) -> (MockDriver, DeviceTopology) {
    let driver = MockDriver::new(num_devices);
    let topology = DeviceTopology::discover(&driver).unwrap();
    (driver, topology)
}

#[test]
fn test_device_guard_restores_previous_device() {
    let (driver, topology) = fixture(2);

    assert_eq!(current_device(), 0);
    {
        let _guard = DeviceGuard::with_driver(&driver, &topology, 1).unwrap();
        assert_eq!(current_device(), 1);
    }
    assert_eq!(current_device(), 0);
    assert_eq!(*driver.device_log.lock(), vec![1, 0]);
}

#[test]
fn test_device_guard_nesting_unwinds_lifo() {
    let (driver, topology) = fixture(3);

    assert_eq!(current_device(), 0);
    {
        let _outer = DeviceGuard::with_driver(&driver, &topology, 1).unwrap();
        assert_eq!(current_device(), 1);
        {
            let _inner = DeviceGuard::with_driver(&driver, &topology, 2).unwrap();
            assert_eq!(current_device(), 2);
        }
        assert_eq!(current_device(), 1);
    }
    assert_eq!(current_device(), 0);
}

#[test]
fn test_device_guard_rejects_out_of_range_ids() {
    let (driver, topology) = fixture(2);

    assert!(matches!(
        DeviceGuard::with_driver(&driver, &topology, -1),
        Err(Error::InvalidDevice { device_id: -1, num_devices: 2 })
    ));
    assert!(matches!(
        DeviceGuard::with_driver(&driver, &topology, 2),
        Err(Error::InvalidDevice { device_id: 2, num_devices: 2 })
    ));

    // No thread state was touched and no driver call was issued.
    assert_eq!(current_device(), 0);
    assert!(driver.device_log.lock().is_empty());
}

#[test]
fn test_guards_fail_without_devices() {
    let (driver, topology) = fixture(0);

    assert!(matches!(
        DeviceGuard::with_driver(&driver, &topology, 0),
        Err(Error::NoAccelerator)
    ));
    assert!(matches!(
        StreamGuard::create_with_driver(&driver, &topology),
        Err(Error::NoAccelerator)
    ));
    assert!(matches!(
        StreamGuard::bind_with_driver(&driver, &topology, StreamHandle::DEFAULT),
        Err(Error::NoAccelerator)
    ));
}

#[test]
fn test_device_guard_driver_failure_leaves_state_untouched() {
    let (driver, topology) = fixture(2);
    driver.fail_set_device.store(true, Ordering::Relaxed);

    assert!(matches!(
        DeviceGuard::with_driver(&driver, &topology, 1),
        Err(Error::Runtime { .. })
    ));
    assert_eq!(current_device(), 0);
}

#[test]
fn test_device_guard_restores_on_unwind() {
    let (driver, topology) = fixture(2);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _guard = DeviceGuard::with_driver(&driver, &topology, 1).unwrap();
        panic!("guarded scope failed");
    }));

    assert!(result.is_err());
    assert_eq!(current_device(), 0);
    assert_eq!(*driver.device_log.lock(), vec![1, 0]);
}

#[test]
fn test_stream_guard_bind_never_destroys() {
    let (driver, topology) = fixture(1);

    let external = driver.create_stream(0).unwrap();
    {
        let _guard = StreamGuard::bind_with_driver(&driver, &topology, external).unwrap();
        assert_eq!(current_stream(), external);
    }

    assert_eq!(current_stream(), StreamHandle::DEFAULT);
    assert!(driver.destroyed_streams().is_empty());
    assert_eq!(driver.live_stream_count(), 1);
}

#[test]
fn test_stream_guard_create_destroys_exactly_once() {
    let (driver, topology) = fixture(1);

    let stream = {
        let guard = StreamGuard::create_with_driver(&driver, &topology).unwrap();
        assert_eq!(current_stream(), guard.stream());
        assert!(!guard.stream().is_default());
        guard.stream()
    };

    assert_eq!(current_stream(), StreamHandle::DEFAULT);
    assert_eq!(driver.created_streams.load(Ordering::Relaxed), 1);
    assert_eq!(driver.destroyed_streams(), vec![stream]);
    assert_eq!(driver.live_stream_count(), 0);
}

#[test]
fn test_stream_guard_create_failure_leaves_state_untouched() {
    let (driver, topology) = fixture(1);
    driver.fail_create_stream.store(true, Ordering::Relaxed);

    assert!(matches!(
        StreamGuard::create_with_driver(&driver, &topology),
        Err(Error::Runtime { .. })
    ));
    assert_eq!(current_stream(), StreamHandle::DEFAULT);
    assert_eq!(driver.created_streams.load(Ordering::Relaxed), 0);
}

#[test]
fn test_stream_guard_nesting_restores_inner_then_outer() {
    let (driver, topology) = fixture(1);

    let external = driver.create_stream(0).unwrap();
    {
        let _outer = StreamGuard::bind_with_driver(&driver, &topology, external).unwrap();
        {
            let inner = StreamGuard::create_with_driver(&driver, &topology).unwrap();
            assert_eq!(current_stream(), inner.stream());
        }
        assert_eq!(current_stream(), external);
    }
    assert_eq!(current_stream(), StreamHandle::DEFAULT);
}

#[test]
fn test_stream_guard_destroys_on_unwind() {
    let (driver, topology) = fixture(1);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _guard = StreamGuard::create_with_driver(&driver, &topology).unwrap();
        panic!("guarded scope failed");
    }));

    assert!(result.is_err());
    assert_eq!(driver.destroyed_streams().len(), 1);
    assert_eq!(current_stream(), StreamHandle::DEFAULT);
}

#[test]
fn test_stream_teardown_happens_on_owning_device() {
    let (driver, topology) = fixture(2);

    {
        let _device = DeviceGuard::with_driver(&driver, &topology, 1).unwrap();
        let _stream = StreamGuard::create_with_driver(&driver, &topology).unwrap();
        // Stream guard drops first: teardown must see device 1 active.
    }

    let destroy_log = driver.destroy_log.lock();
    assert_eq!(destroy_log.len(), 1);
    assert_eq!(destroy_log[0].1, 1);
}
