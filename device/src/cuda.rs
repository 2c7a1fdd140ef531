//! CUDA driver implementation on top of cudarc.
//!
//! One primary context per device, created lazily and bound to the
//! calling thread for device switches. Streams created through the
//! driver are tracked in a handle table; destroying a handle removes its
//! entry, and the underlying stream is torn down once the last reference
//! drops.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cudarc::driver::{CudaContext, CudaStream, result, sys};
use parking_lot::Mutex;
use snafu::ResultExt;

use crate::driver::{AcceleratorDriver, StreamHandle};
use crate::error::{CudaSnafu, Result, RuntimeSnafu};

#[derive(Debug)]
pub struct CudaDriver {
    contexts: Mutex<HashMap<i32, Arc<CudaContext>>>,
    streams: Mutex<HashMap<u64, Arc<CudaStream>>>,
    // Handle 0 is reserved for the implicit stream.
    next_stream_id: AtomicU64,
}

impl CudaDriver {
    /// Initialize the CUDA driver. Zero visible devices is not an error.
    pub fn new() -> Result<Self> {
        result::init().context(CudaSnafu)?;
        let count = result::device::get_count().context(CudaSnafu)?;
        tracing::debug!("CUDA driver initialized, {count} device(s) visible");

        Ok(Self {
            contexts: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(1),
        })
    }

    /// Primary context for `device_id`, created on first use.
    fn context(&self, device_id: i32) -> Result<Arc<CudaContext>> {
        let mut contexts = self.contexts.lock();
        if let Some(context) = contexts.get(&device_id) {
            return Ok(Arc::clone(context));
        }

        let context = CudaContext::new(device_id as usize).context(CudaSnafu)?;
        contexts.insert(device_id, Arc::clone(&context));
        Ok(context)
    }

    /// Resolve a handle to the underlying stream, for work submission.
    ///
    /// The returned reference keeps the stream alive even past
    /// `destroy_stream`; actual teardown happens when the last reference
    /// drops.
    pub fn resolve_stream(&self, stream: StreamHandle) -> Option<Arc<CudaStream>> {
        self.streams.lock().get(&stream.raw()).map(Arc::clone)
    }

    fn attribute(&self, device_id: i32, attribute: sys::CUdevice_attribute) -> Result<i32> {
        self.context(device_id)?.attribute(attribute).context(CudaSnafu)
    }
}

impl AcceleratorDriver for CudaDriver {
    fn device_count(&self) -> Result<i32> {
        result::device::get_count().context(CudaSnafu)
    }

    fn warp_size(&self, device_id: i32) -> Result<i32> {
        self.attribute(device_id, sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_WARP_SIZE)
    }

    fn texture_alignment(&self, device_id: i32) -> Result<i32> {
        self.attribute(device_id, sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_TEXTURE_ALIGNMENT)
    }

    fn can_access_peer(&self, src: i32, tgt: i32) -> Result<bool> {
        let src_device = result::device::get(src).context(CudaSnafu)?;
        let tgt_device = result::device::get(tgt).context(CudaSnafu)?;

        let mut accessible = 0i32;
        unsafe { sys::cuDeviceCanAccessPeer(&mut accessible, src_device, tgt_device) }
            .result()
            .context(CudaSnafu)?;
        Ok(accessible != 0)
    }

    fn set_device(&self, device_id: i32) -> Result<()> {
        self.context(device_id)?.bind_to_thread().context(CudaSnafu)
    }

    fn create_stream(&self, device_id: i32) -> Result<StreamHandle> {
        let stream = self.context(device_id)?.new_stream().context(CudaSnafu)?;

        let raw = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(raw, stream);
        Ok(StreamHandle::from_raw(raw))
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<()> {
        match self.streams.lock().remove(&stream.raw()) {
            Some(_stream) => Ok(()),
            None => RuntimeSnafu { message: format!("unknown stream handle {stream:?}") }.fail(),
        }
    }
}
