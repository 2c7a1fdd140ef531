use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Device id is outside `[0, num_devices)`.
    #[snafu(display("invalid device id {device_id}: {num_devices} device(s) visible"))]
    InvalidDevice { device_id: i32, num_devices: i32 },

    /// No accelerator backend is compiled in, or no device is present.
    #[snafu(display("accelerator support is not built or no device is present"))]
    NoAccelerator,

    /// A driver call failed on a recoverable path.
    #[snafu(display("accelerator runtime error: {message}"))]
    Runtime { message: String },

    #[cfg(feature = "cuda")]
    /// CUDA-specific errors.
    #[snafu(display("CUDA error: {source}"))]
    Cuda { source: cudarc::driver::DriverError },
}

/// Abort the process after an unrecoverable context failure.
///
/// Guard destructors cannot report errors to an unwinding caller, and a
/// failed restoration leaves the thread's device/stream state unknown.
/// Logs the caller's file/line and the driver's message, then aborts.
#[track_caller]
pub(crate) fn fatal(message: &str) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!("fatal accelerator context error at {location}: {message}");
    std::process::abort();
}
