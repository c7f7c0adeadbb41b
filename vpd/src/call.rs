//! Single ibm,get-vpd chunk call.
//!
//! # Call contract
//!
//! ```text
//! in:  location code address, work area address, work area size, sequence
//! out: status, next sequence, bytes written
//! ```
//!
//! One [`get_vpd`] issues the firmware call, waits out busy statuses under
//! the configured [`BusyPolicy`], and folds the raw status into a
//! [`ChunkStatus`]. The sequence number is opaque: it is copied out of one
//! call and into the next, nothing else.
//!
//! Firmware reporting more bytes written than the work area holds means the
//! write already went past the buffer. That is not an error to hand back to
//! the caller; it panics.

use log::{debug, error, trace, warn};
use rtas_work_area::WorkAreaBuf;

use crate::config::{BusyPolicy, BUSY_DELAY_MS};
use crate::error::{Result, VpdError};

// ═══════════════════════════════════════════════════════════════════════════
// FIRMWARE BOUNDARY
// ═══════════════════════════════════════════════════════════════════════════

/// Inputs of one raw ibm,get-vpd call.
pub struct GetVpdArgs<'a> {
    /// Terminated location code, resident in a work area.
    pub loc_code: &'a [u8],
    /// Firmware address of `loc_code`.
    pub loc_code_addr: u64,
    /// Output buffer.
    pub work_area: &'a mut [u8],
    /// Firmware address of `work_area`.
    pub work_area_addr: u64,
    /// Sequence number: 1 to start, then whatever the last call returned.
    pub sequence: u32,
}

/// Outputs of one raw ibm,get-vpd call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetVpdRets {
    /// Raw firmware status.
    pub status: i32,
    /// Sequence number for the next call (meaningful for status 1).
    pub next_sequence: u32,
    /// Bytes written to the work area.
    pub written: u32,
}

/// Platform firmware providing ibm,get-vpd.
///
/// The call is stateful on the firmware side: it remembers where the
/// current sequence stands, so only one sequence may be in flight at a time.
pub trait Firmware {
    /// Whether ibm,get-vpd exists on this platform.
    fn implements_get_vpd(&self) -> bool {
        true
    }

    /// Make one synchronous ibm,get-vpd call.
    fn ibm_get_vpd(&self, args: GetVpdArgs<'_>) -> GetVpdRets;
}

impl<F: Firmware + ?Sized> Firmware for &F {
    fn implements_get_vpd(&self) -> bool {
        (**self).implements_get_vpd()
    }

    fn ibm_get_vpd(&self, args: GetVpdArgs<'_>) -> GetVpdRets {
        (**self).ibm_get_vpd(args)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STATUS MAPPING
// ═══════════════════════════════════════════════════════════════════════════

/// Raw ibm,get-vpd status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtasStatus {
    /// 0: last chunk written.
    Complete,
    /// 1: chunk written, more to come.
    MoreData,
    /// -1: hardware error.
    HardwareError,
    /// -2: busy, call again.
    Busy,
    /// -3: location code or sequence number rejected.
    ParameterError,
    /// -4: VPD changed under the sequence; it must start over.
    RestartSequence,
    /// 9900..=9905: busy, call again after 10^n ms.
    ExtendedDelay(u8),
    /// Anything undocumented.
    Unknown(i32),
}

impl RtasStatus {
    /// Decode a raw status.
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Complete,
            1 => Self::MoreData,
            -1 => Self::HardwareError,
            -2 => Self::Busy,
            -3 => Self::ParameterError,
            -4 => Self::RestartSequence,
            9900..=9905 => Self::ExtendedDelay((raw - 9900) as u8),
            other => Self::Unknown(other),
        }
    }

    /// Requested wait before retrying, or `None` if this is not a busy status.
    pub const fn busy_delay_ms(&self) -> Option<u32> {
        match self {
            Self::Busy => Some(BUSY_DELAY_MS),
            Self::ExtendedDelay(order) => Some(10u32.pow(*order as u32)),
            _ => None,
        }
    }
}

/// Outcome of one chunk call, after busy retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Work area holds a chunk; another call is needed.
    MoreData,
    /// Work area holds the final chunk (possibly empty).
    Complete,
    /// Firmware rejected the location code or sequence number.
    InvalidInput,
    /// Busy budget exhausted, or firmware asked to restart.
    Busy,
    /// Hardware error or unknown status.
    IoError(i32),
}

impl ChunkStatus {
    /// Map a non-busy raw status.
    pub fn classify(status: RtasStatus) -> Self {
        match status {
            RtasStatus::Complete => Self::Complete,
            RtasStatus::MoreData => Self::MoreData,
            RtasStatus::ParameterError => Self::InvalidInput,
            RtasStatus::RestartSequence => Self::Busy,
            RtasStatus::Busy | RtasStatus::ExtendedDelay(_) => Self::Busy,
            RtasStatus::HardwareError => Self::IoError(-1),
            RtasStatus::Unknown(raw) => {
                error!("unexpected ibm,get-vpd status {}", raw);
                Self::IoError(raw)
            }
        }
    }

    /// True when the work area holds valid data.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::MoreData | Self::Complete)
    }

    /// Error to record for a failed call.
    pub const fn error(&self) -> Option<VpdError> {
        match self {
            Self::MoreData | Self::Complete => None,
            Self::InvalidInput => Some(VpdError::InvalidInput),
            Self::Busy => Some(VpdError::Busy),
            Self::IoError(status) => Some(VpdError::IoFault { status: *status }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CHUNK CALL
// ═══════════════════════════════════════════════════════════════════════════

/// In/out parameters threaded through consecutive chunk calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetVpdParams {
    /// In: sequence number. Out: next sequence number.
    pub sequence: u32,
    /// Out: bytes written by the last call.
    pub written: u32,
    /// Out: outcome of the last call, `None` before the first.
    pub status: Option<ChunkStatus>,
}

impl GetVpdParams {
    /// Sequence number that starts a retrieval.
    pub const START_SEQUENCE: u32 = 1;

    /// Parameters for the first call of a sequence.
    pub const fn new() -> Self {
        Self {
            sequence: Self::START_SEQUENCE,
            written: 0,
            status: None,
        }
    }
}

impl Default for GetVpdParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Issue one chunk call and update `params`.
///
/// # Panics
///
/// If firmware reports more bytes written than `work_area` holds.
pub fn get_vpd<F, L, W>(
    firmware: &F,
    loc_code: &L,
    work_area: &mut W,
    params: &mut GetVpdParams,
    policy: &BusyPolicy,
) -> Result<ChunkStatus>
where
    F: Firmware + ?Sized,
    L: WorkAreaBuf,
    W: WorkAreaBuf,
{
    debug!(
        "get_vpd entry: seq={} written={} status={:?}",
        params.sequence, params.written, params.status
    );

    let mut retries = 0u32;
    let (raw, rets) = loop {
        let loc_code_addr = loc_code.phys();
        let work_area_addr = work_area.phys();
        let rets = firmware.ibm_get_vpd(GetVpdArgs {
            loc_code: loc_code.as_slice(),
            loc_code_addr,
            work_area: work_area.as_mut_slice(),
            work_area_addr,
            sequence: params.sequence,
        });
        let raw = RtasStatus::from_raw(rets.status);

        let Some(delay) = raw.busy_delay_ms() else {
            break (raw, rets);
        };
        if retries >= policy.max_retries {
            warn!("ibm,get-vpd still busy after {} retries", retries);
            break (raw, rets);
        }
        retries += 1;
        trace!("ibm,get-vpd busy ({}), retry {} in {} ms", rets.status, retries, delay);
        (policy.sleep)(policy.clamp(delay));
    };

    let status = ChunkStatus::classify(raw);
    match status {
        ChunkStatus::MoreData => {
            params.sequence = rets.next_sequence;
            params.written = check_written(rets.written, work_area.size());
        }
        ChunkStatus::Complete => {
            params.written = check_written(rets.written, work_area.size());
        }
        _ => params.written = 0,
    }
    params.status = Some(status);

    debug!(
        "get_vpd exit: seq={} written={} status={:?} raw={}",
        params.sequence, params.written, status, rets.status
    );

    match status.error() {
        Some(err) => Err(err),
        None => Ok(status),
    }
}

/// Firmware or driver bug: the write already overran the work area.
fn check_written(written: u32, capacity: usize) -> u32 {
    if written as usize > capacity {
        error!(
            "ibm,get-vpd wrote {} bytes to a {}-byte work area",
            written, capacity
        );
        panic!(
            "possible write beyond end of work area: {} bytes reported, {} available",
            written, capacity
        );
    }
    written
}
