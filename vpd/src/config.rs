//! Retrieval configuration.
//!
//! The sequence state machine imposes no timeout of its own; the only bound
//! on how long one chunk call may spin on a busy firmware lives here.

/// Work area size for one ibm,get-vpd chunk (4KB).
pub const VPD_WORK_AREA_SIZE: u32 = 4096;

/// Wait for a plain busy (-2) status, in milliseconds.
pub const BUSY_DELAY_MS: u32 = 1;

/// Default number of busy retries per chunk call.
pub const DEFAULT_MAX_BUSY_RETRIES: u32 = 1024;

/// Default cap on a single extended delay (1 second).
pub const DEFAULT_MAX_DELAY_MS: u32 = 1000;

/// How a chunk call waits out a busy firmware.
#[derive(Debug, Clone, Copy)]
pub struct BusyPolicy {
    /// Busy statuses tolerated per chunk call before giving up with
    /// [`crate::VpdError::Busy`].
    pub max_retries: u32,
    /// Cap on any single requested delay.
    pub max_delay_ms: u32,
    /// Sleep primitive.
    pub sleep: fn(u32),
}

impl BusyPolicy {
    /// Policy that never sleeps, for simulated firmware and tests.
    pub fn no_sleep(max_retries: u32) -> Self {
        Self {
            max_retries,
            max_delay_ms: 0,
            sleep: skip_sleep,
        }
    }

    /// Delay actually applied for a requested delay.
    pub fn clamp(&self, requested_ms: u32) -> u32 {
        requested_ms.min(self.max_delay_ms)
    }
}

impl Default for BusyPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_BUSY_RETRIES,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            sleep: default_sleep,
        }
    }
}

fn skip_sleep(_ms: u32) {}

#[cfg(feature = "std")]
fn default_sleep(ms: u32) {
    std::thread::sleep(std::time::Duration::from_millis(ms as u64));
}

#[cfg(not(feature = "std"))]
fn default_sleep(ms: u32) {
    // No timer available: burn roughly `ms` worth of spin hints.
    for _ in 0..(ms as u64) * 100_000 {
        core::hint::spin_loop();
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Copy)]
pub struct VpdConfig {
    /// Bytes of work area offered to firmware per chunk.
    pub work_area_size: u32,
    /// Busy handling for each chunk call.
    pub busy: BusyPolicy,
    /// Largest VPD blob accepted; retrieval fails with
    /// [`crate::VpdError::ResourceExhausted`] beyond it.
    pub max_vpd_size: usize,
}

impl VpdConfig {
    /// Override the chunk work area size.
    pub fn with_work_area_size(mut self, size: u32) -> Self {
        self.work_area_size = size;
        self
    }

    /// Override the busy policy.
    pub fn with_busy_policy(mut self, busy: BusyPolicy) -> Self {
        self.busy = busy;
        self
    }

    /// Cap the size of a retrieved blob.
    pub fn with_max_vpd_size(mut self, max: usize) -> Self {
        self.max_vpd_size = max;
        self
    }
}

impl Default for VpdConfig {
    fn default() -> Self {
        Self {
            work_area_size: VPD_WORK_AREA_SIZE,
            busy: BusyPolicy::default(),
            max_vpd_size: usize::MAX,
        }
    }
}
