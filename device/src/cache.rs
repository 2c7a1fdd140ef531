//! Call-through to the buffer-cache subsystem.
//!
//! This crate owns no allocator. Subsystems that cache device memory
//! (the tensor library's caching allocators) register a release hook
//! here, and [`release_cache`] asks each of them to drop
//! cached-but-unused buffers.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

static RELEASE_HOOKS: Lazy<Mutex<Vec<ReleaseHook>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Register a hook invoked by [`release_cache`].
///
/// Hooks must be idempotent and safe to call when nothing is cached.
pub fn register_release_hook(hook: impl Fn() + Send + Sync + 'static) {
    RELEASE_HOOKS.lock().push(Arc::new(hook));
}

/// Ask every registered cache to release unused device buffers.
///
/// Runs the hooks synchronously on the calling thread. Idempotent, and a
/// no-op when no hook is registered.
pub fn release_cache() {
    // Snapshot outside the lock so a hook may itself register hooks.
    let hooks: Vec<ReleaseHook> = RELEASE_HOOKS.lock().clone();
    for hook in &hooks {
        hook();
    }
}
