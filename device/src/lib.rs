//! Accelerator device and stream context management.
//!
//! This crate owns three things on behalf of the rest of zarya:
//!
//! - **Topology**: a process-wide, lazily-discovered, immutable snapshot
//!   of the visible devices ([`DeviceTopology`]): count, per-device warp
//!   width, directional peer-to-peer accessibility.
//! - **Per-thread context**: each host thread's current device id and
//!   current stream, mirroring the thread-local context model the driver
//!   imposes ([`current_device`], [`current_stream`]).
//! - **Scope guards**: RAII wrappers that switch the thread's context and
//!   guarantee restoration on scope exit, including unwind paths
//!   ([`DeviceGuard`], [`StreamGuard`]).
//!
//! Everything compiles and runs with no accelerator present: without the
//! `cuda` feature (or without hardware), [`device_count`] is 0,
//! [`is_available`] is false, and guard construction fails with
//! [`Error::NoAccelerator`] instead of silently doing nothing.
//!
//! Callers must never touch driver state directly; this façade and the
//! two guard types are the only accelerator-context primitives the rest
//! of the project uses.

use snafu::ensure;

pub mod cache;
pub mod context;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod driver;
pub mod error;
pub mod guard;
pub mod topology;

#[cfg(test)]
mod test;

pub use cache::{register_release_hook, release_cache};
pub use driver::{AcceleratorDriver, NullDriver, StreamHandle, driver};
pub use error::{Error, Result};
pub use guard::{DeviceGuard, StreamGuard};
pub use topology::DeviceTopology;

use error::NoAcceleratorSnafu;

/// Number of visible accelerator devices.
///
/// 0 when no backend is compiled in or no hardware is present; that is
/// not an error by itself.
pub fn device_count() -> i32 {
    DeviceTopology::global().num_devices()
}

/// Whether at least one accelerator device is usable.
pub fn is_available() -> bool {
    device_count() > 0
}

/// Device id the calling thread currently targets.
pub fn current_device() -> i32 {
    context::current_device()
}

/// Stream the calling thread currently targets.
pub fn current_stream() -> StreamHandle {
    context::current_stream()
}

/// The driver's implicit stream. Not affected by scope guards.
pub fn default_stream() -> StreamHandle {
    StreamHandle::DEFAULT
}

/// Warp/lane width of the thread's current device.
pub fn warp_size() -> Result<i32> {
    let topology = DeviceTopology::global();
    ensure!(topology.num_devices() > 0, NoAcceleratorSnafu);
    topology.warp_size()
}

/// Texture alignment in bytes for the thread's current device.
///
/// Queried live from the driver rather than cached in the topology
/// snapshot.
pub fn texture_alignment() -> Result<i32> {
    let topology = DeviceTopology::global();
    ensure!(topology.num_devices() > 0, NoAcceleratorSnafu);

    let device_id = context::current_device();
    topology.check_device(device_id)?;
    driver().texture_alignment(device_id)
}
