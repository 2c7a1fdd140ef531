//! Scope guards for the thread's device and stream context.
//!
//! Construction switches the calling thread's context; dropping restores
//! whatever was active just before, on every exit path including unwind.
//! Guards nest strictly last-in first-out within one thread. Each
//! destructor blindly restores the state it captured, which is only
//! correct when guards unwind in reverse construction order.
//!
//! The guard types are neither `Send` nor `Sync`, so a guard cannot be
//! moved to or destroyed by a thread other than the one that constructed
//! it.
//!
//! # Example
//!
//! ```ignore
//! // Current device is 0.
//! {
//!     let _device = DeviceGuard::new(1)?;
//!     // Device 1 is current; issue work for it here.
//!     let _stream = StreamGuard::create()?;
//!     // Work now targets a fresh stream on device 1.
//! }
//! // Stream destroyed, device 0 current again.
//! ```

use std::marker::PhantomData;

use snafu::ensure;

use crate::context;
use crate::driver::{self, AcceleratorDriver, StreamHandle};
use crate::error::{NoAcceleratorSnafu, Result};
use crate::topology::DeviceTopology;

/// Marker that pins a guard to its constructing thread.
type ThreadBound = PhantomData<*const ()>;

/// Switches the thread's current device for the guard's lifetime.
pub struct DeviceGuard<'d> {
    driver: &'d dyn AcceleratorDriver,
    prev_device: i32,
    _thread_bound: ThreadBound,
}

impl DeviceGuard<'static> {
    /// Make `device_id` the thread's current device until drop.
    ///
    /// Fails with [`Error::NoAccelerator`](crate::Error::NoAccelerator)
    /// when no device is present, and with
    /// [`Error::InvalidDevice`](crate::Error::InvalidDevice) when the id
    /// is out of range. Thread state is untouched on failure.
    pub fn new(device_id: i32) -> Result<Self> {
        Self::with_driver(driver::driver(), DeviceTopology::global(), device_id)
    }
}

impl<'d> DeviceGuard<'d> {
    /// Like [`DeviceGuard::new`], against an explicit driver and topology.
    pub fn with_driver(
        driver: &'d dyn AcceleratorDriver,
        topology: &DeviceTopology,
        device_id: i32,
    ) -> Result<Self> {
        ensure!(topology.num_devices() > 0, NoAcceleratorSnafu);
        topology.check_device(device_id)?;

        let prev_device = context::current_device();
        driver.set_device(device_id)?;
        context::set_current_device(device_id);

        Ok(Self { driver, prev_device, _thread_bound: PhantomData })
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.driver.set_device(self.prev_device) {
            crate::error::fatal(&format!(
                "failed to restore device {}: {error}",
                self.prev_device
            ));
        }
        context::set_current_device(self.prev_device);
    }
}

/// Switches the thread's current stream for the guard's lifetime.
///
/// Two modes:
/// - [`StreamGuard::bind`] wraps an externally-owned stream; the guard
///   only restores the prior stream on drop and never destroys the bound
///   one.
/// - [`StreamGuard::create`] asks the driver for a fresh stream on the
///   thread's current device and owns it: on drop the prior stream is
///   restored first, then the owned stream is destroyed. Drop a stream
///   guard before the device guard it was constructed under, so teardown
///   happens while the owning device is still current.
pub struct StreamGuard<'d> {
    driver: &'d dyn AcceleratorDriver,
    device_id: i32,
    prev_stream: StreamHandle,
    stream: StreamHandle,
    owns_stream: bool,
    _thread_bound: ThreadBound,
}

impl StreamGuard<'static> {
    /// Make an externally-owned `stream` current until drop.
    pub fn bind(stream: StreamHandle) -> Result<Self> {
        Self::bind_with_driver(driver::driver(), DeviceTopology::global(), stream)
    }

    /// Create a fresh stream on the thread's current device and make it
    /// current until drop.
    ///
    /// Creation failure is recoverable: the error is returned and thread
    /// state is left unmodified.
    pub fn create() -> Result<Self> {
        Self::create_with_driver(driver::driver(), DeviceTopology::global())
    }
}

impl<'d> StreamGuard<'d> {
    /// Like [`StreamGuard::bind`], against an explicit driver and
    /// topology.
    pub fn bind_with_driver(
        driver: &'d dyn AcceleratorDriver,
        topology: &DeviceTopology,
        stream: StreamHandle,
    ) -> Result<Self> {
        ensure!(topology.num_devices() > 0, NoAcceleratorSnafu);

        let device_id = context::current_device();
        let prev_stream = context::stream_for(device_id);
        context::set_stream_for(device_id, stream);

        Ok(Self { driver, device_id, prev_stream, stream, owns_stream: false, _thread_bound: PhantomData })
    }

    /// Like [`StreamGuard::create`], against an explicit driver and
    /// topology.
    pub fn create_with_driver(
        driver: &'d dyn AcceleratorDriver,
        topology: &DeviceTopology,
    ) -> Result<Self> {
        ensure!(topology.num_devices() > 0, NoAcceleratorSnafu);

        let device_id = context::current_device();
        let prev_stream = context::stream_for(device_id);
        let stream = driver.create_stream(device_id)?;
        context::set_stream_for(device_id, stream);

        Ok(Self { driver, device_id, prev_stream, stream, owns_stream: true, _thread_bound: PhantomData })
    }

    /// Handle of the stream this guard made current.
    pub fn stream(&self) -> StreamHandle {
        self.stream
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        // Restore before destroying: the owned stream must no longer be
        // current when it is torn down.
        context::set_stream_for(self.device_id, self.prev_stream);
        if self.owns_stream {
            if let Err(error) = self.driver.destroy_stream(self.stream) {
                crate::error::fatal(&format!(
                    "failed to destroy stream {:?}: {error}",
                    self.stream
                ));
            }
        }
    }
}
