//! Device profile and import batch sizing.

const GIB: u64 = 1024 * 1024 * 1024;

/// Hardware characteristics of the device, supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Total physical memory in bytes.
    pub total_memory_bytes: u64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        // A mid-range device; hosts that know better should say so.
        Self {
            total_memory_bytes: 4 * GIB,
            cpu_cores: 4,
        }
    }
}

/// Picks the initial import batch size (in rows) for a device.
///
/// Larger batches amortize statement overhead but hold more parsed rows in
/// memory; low-core devices get half to keep the parse/flush cadence from
/// starving the UI thread.
pub fn optimal_batch_size(profile: &DeviceProfile) -> usize {
    let by_memory = if profile.total_memory_bytes >= 6 * GIB {
        2000
    } else if profile.total_memory_bytes >= 4 * GIB {
        1500
    } else if profile.total_memory_bytes >= 3 * GIB {
        1000
    } else if profile.total_memory_bytes >= 2 * GIB {
        500
    } else {
        250
    };

    if profile.cpu_cores <= 2 {
        by_memory / 2
    } else {
        by_memory
    }
}
