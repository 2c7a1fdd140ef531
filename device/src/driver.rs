//! Driver seam between the context core and the accelerator runtime.
//!
//! Everything that crosses into the driver goes through the
//! [`AcceleratorDriver`] trait: the topology queries issued at discovery
//! time and the control-plane calls issued by the scope guards. The trait
//! keeps the rest of the crate compilable and testable with no accelerator
//! present; [`NullDriver`] stands in whenever the `cuda` feature is off or
//! runtime initialization fails.
//!
//! All calls here are synchronous, bounded control-plane operations. None
//! of them is cancellable or carries a timeout.

use std::fmt;

use once_cell::sync::Lazy;

use crate::error::{NoAcceleratorSnafu, Result};

/// Opaque identity of a driver-level stream.
///
/// Handles are plain ids; the driver implementation owns the mapping to
/// real stream objects. [`StreamHandle::DEFAULT`] names the driver's
/// implicit stream, which is never created or destroyed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    /// The driver's implicit/default stream.
    pub const DEFAULT: StreamHandle = StreamHandle(0);

    pub(crate) const fn from_raw(raw: u64) -> Self {
        StreamHandle(raw)
    }

    pub(crate) const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this handle names the implicit stream.
    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

/// Control-plane interface to the accelerator driver.
///
/// Implementations must be safe to call from any thread; `set_device`
/// affects only the calling thread, mirroring the driver's thread-local
/// context model.
pub trait AcceleratorDriver: Send + Sync + fmt::Debug {
    /// Number of visible devices. Zero is not an error.
    fn device_count(&self) -> Result<i32>;

    /// Hardware warp/lane width of `device_id`.
    fn warp_size(&self, device_id: i32) -> Result<i32>;

    /// Texture alignment in bytes for `device_id`.
    fn texture_alignment(&self, device_id: i32) -> Result<i32>;

    /// Whether `src` can address `tgt`'s memory directly.
    ///
    /// Directional: `(src, tgt)` and `(tgt, src)` are independent queries.
    fn can_access_peer(&self, src: i32, tgt: i32) -> Result<bool>;

    /// Make `device_id` the calling thread's active device.
    fn set_device(&self, device_id: i32) -> Result<()>;

    /// Create a fresh stream on `device_id`.
    fn create_stream(&self, device_id: i32) -> Result<StreamHandle>;

    /// Destroy a stream previously returned by
    /// [`create_stream`](AcceleratorDriver::create_stream).
    fn destroy_stream(&self, stream: StreamHandle) -> Result<()>;
}

/// Driver used when no accelerator backend is available.
///
/// Reports zero devices and fails loudly on anything that would need
/// hardware, so callers that assumed hardware presence see a real error
/// instead of a silent no-op.
#[derive(Debug, Clone, Copy)]
pub struct NullDriver;

impl AcceleratorDriver for NullDriver {
    fn device_count(&self) -> Result<i32> {
        Ok(0)
    }

    fn warp_size(&self, _device_id: i32) -> Result<i32> {
        NoAcceleratorSnafu.fail()
    }

    fn texture_alignment(&self, _device_id: i32) -> Result<i32> {
        NoAcceleratorSnafu.fail()
    }

    fn can_access_peer(&self, _src: i32, _tgt: i32) -> Result<bool> {
        NoAcceleratorSnafu.fail()
    }

    fn set_device(&self, _device_id: i32) -> Result<()> {
        NoAcceleratorSnafu.fail()
    }

    fn create_stream(&self, _device_id: i32) -> Result<StreamHandle> {
        NoAcceleratorSnafu.fail()
    }

    fn destroy_stream(&self, _stream: StreamHandle) -> Result<()> {
        NoAcceleratorSnafu.fail()
    }
}

static DRIVER: Lazy<Box<dyn AcceleratorDriver>> = Lazy::new(|| {
    #[cfg(feature = "cuda")]
    match crate::cuda::CudaDriver::new() {
        Ok(driver) => return Box::new(driver),
        Err(error) => {
            tracing::warn!("CUDA driver unavailable, falling back to the null driver: {error}");
        }
    }

    Box::new(NullDriver)
});

/// Process-wide driver instance.
pub fn driver() -> &'static dyn AcceleratorDriver {
    &**DRIVER
}
