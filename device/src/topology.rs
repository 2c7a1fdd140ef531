//! Process-wide snapshot of accelerator topology.
//!
//! Discovery runs exactly once per process, on first access to
//! [`DeviceTopology::global`]: device count, each device's warp width,
//! and peer accessibility for every ordered pair of distinct devices.
//! The snapshot is read-only afterwards and shared by all threads without
//! locking. The only mutable bit is the test-only P2P kill switch.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use snafu::ensure;

use crate::context;
use crate::driver::{self, AcceleratorDriver};
use crate::error::{InvalidDeviceSnafu, Result};

#[derive(Debug)]
pub struct DeviceTopology {
    num_devices: i32,
    warp_sizes: Vec<i32>,
    p2p_enabled: Vec<Vec<bool>>,
    p2p_force_disabled: AtomicBool,
}

impl DeviceTopology {
    /// Run the discovery sequence against `driver`.
    ///
    /// Peer access is recorded directionally; real topologies can be
    /// asymmetric. The diagonal is `true`: a device reaches its own
    /// memory trivially.
    pub fn discover(driver: &dyn AcceleratorDriver) -> Result<Self> {
        let num_devices = driver.device_count()?;

        let mut warp_sizes = Vec::with_capacity(num_devices as usize);
        for device_id in 0..num_devices {
            warp_sizes.push(driver.warp_size(device_id)?);
        }

        let mut p2p_enabled = vec![vec![false; num_devices as usize]; num_devices as usize];
        for src in 0..num_devices {
            p2p_enabled[src as usize][src as usize] = true;
            for tgt in 0..num_devices {
                if src != tgt {
                    p2p_enabled[src as usize][tgt as usize] = driver.can_access_peer(src, tgt)?;
                }
            }
        }

        Ok(Self { num_devices, warp_sizes, p2p_enabled, p2p_force_disabled: AtomicBool::new(false) })
    }

    /// The shared process-wide snapshot, discovering on first access.
    ///
    /// Concurrent first calls are serialized: exactly one thread runs
    /// discovery and every caller observes the fully-formed snapshot.
    /// A driver failure during discovery is fatal; the process cannot
    /// continue without knowing its topology, and discovery is not
    /// retried.
    pub fn global() -> &'static DeviceTopology {
        static TOPOLOGY: Lazy<DeviceTopology> = Lazy::new(|| {
            match DeviceTopology::discover(driver::driver()) {
                Ok(topology) => topology,
                Err(error) => crate::error::fatal(&format!("device topology discovery failed: {error}")),
            }
        });
        &TOPOLOGY
    }

    /// Number of visible devices. Zero when no backend or hardware is
    /// present.
    pub fn num_devices(&self) -> i32 {
        self.num_devices
    }

    /// Warp/lane width of the calling thread's current device.
    pub fn warp_size(&self) -> Result<i32> {
        let device_id = context::current_device();
        self.check_device(device_id)?;
        Ok(self.warp_sizes[device_id as usize])
    }

    /// Whether `src` can address `tgt`'s memory directly.
    ///
    /// Reports `false` for every pair once
    /// [`force_disable_p2p_for_testing`](Self::force_disable_p2p_for_testing)
    /// has been called, before any range validation.
    pub fn is_p2p_enabled(&self, src: i32, tgt: i32) -> Result<bool> {
        if self.p2p_force_disabled.load(Ordering::Relaxed) {
            return Ok(false);
        }
        self.check_device(src)?;
        self.check_device(tgt)?;
        Ok(self.p2p_enabled[src as usize][tgt as usize])
    }

    /// Copy of the full peer-access matrix, for diagnostics and tests.
    ///
    /// Unaffected by the force-disable flag.
    pub fn p2p_matrix(&self) -> Vec<Vec<bool>> {
        self.p2p_enabled.clone()
    }

    /// Make every `is_p2p_enabled` query report `false`.
    ///
    /// One-way for the process lifetime; there is no re-enable. Intended
    /// for test harnesses that need the non-peer code paths on
    /// peer-capable hardware. Call during single-threaded setup: the flag
    /// is not synchronized against in-flight queries from other threads.
    pub fn force_disable_p2p_for_testing(&self) {
        self.p2p_force_disabled.store(true, Ordering::Relaxed);
    }

    pub(crate) fn check_device(&self, device_id: i32) -> Result<()> {
        ensure!(
            (0..self.num_devices).contains(&device_id),
            InvalidDeviceSnafu { device_id, num_devices: self.num_devices }
        );
        Ok(())
    }
}
