//! Per-thread execution context.
//!
//! Each host thread carries its own view of "what the next accelerator
//! operation targets": a current device id and a current stream per
//! device. The context is created on first touch and dies with the
//! thread; nothing else ever references it, so no synchronization is
//! involved. Only the scope guards mutate it.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::driver::StreamHandle;

/// Device id a fresh thread starts on (the driver default).
const DEFAULT_DEVICE: i32 = 0;

#[derive(Debug)]
struct ExecutionContext {
    current_device: i32,
    current_streams: HashMap<i32, StreamHandle>,
}

impl ExecutionContext {
    fn new() -> Self {
        Self { current_device: DEFAULT_DEVICE, current_streams: HashMap::new() }
    }
}

thread_local! {
    static CONTEXT: RefCell<ExecutionContext> = RefCell::new(ExecutionContext::new());
}

/// Device id the calling thread currently targets.
pub fn current_device() -> i32 {
    CONTEXT.with(|context| context.borrow().current_device)
}

pub(crate) fn set_current_device(device_id: i32) {
    CONTEXT.with(|context| context.borrow_mut().current_device = device_id);
}

/// Stream the calling thread currently targets on its current device.
///
/// Falls back to [`StreamHandle::DEFAULT`] when no scope has overridden
/// it.
pub fn current_stream() -> StreamHandle {
    CONTEXT.with(|context| {
        let context = context.borrow();
        context
            .current_streams
            .get(&context.current_device)
            .copied()
            .unwrap_or(StreamHandle::DEFAULT)
    })
}

pub(crate) fn stream_for(device_id: i32) -> StreamHandle {
    CONTEXT.with(|context| {
        context.borrow().current_streams.get(&device_id).copied().unwrap_or(StreamHandle::DEFAULT)
    })
}

pub(crate) fn set_stream_for(device_id: i32, stream: StreamHandle) {
    CONTEXT.with(|context| {
        context.borrow_mut().current_streams.insert(device_id, stream);
    });
}
