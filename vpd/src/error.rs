//! Error types for VPD retrieval

use rtas_work_area::WorkAreaError;

/// Result type for VPD operations
pub type Result<T> = core::result::Result<T, VpdError>;

/// Errors surfaced by location code validation, retrieval and handle export.
///
/// A firmware write past the end of the work area has no variant
/// here: it panics instead of being returned (see [`crate::call`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VpdError {
    /// Malformed location code or handle request, or firmware rejected the
    /// location code / sequence number
    #[error("invalid location code or request")]
    InvalidInput,

    /// Work area or blob growth allocation failed
    #[error("out of memory")]
    ResourceExhausted,

    /// Firmware stayed busy past the retry budget, or asked for the
    /// sequence to be restarted
    #[error("firmware busy")]
    Busy,

    /// Hardware error or undocumented firmware status
    #[error("firmware I/O error (status {status})")]
    IoFault {
        /// Raw firmware status
        status: i32,
    },

    /// Firmware does not implement ibm,get-vpd
    #[error("ibm,get-vpd not implemented by firmware")]
    NoDevice,
}

const EIO: i32 = 5;
const EAGAIN: i32 = 11;
const ENOMEM: i32 = 12;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;

impl VpdError {
    /// Negative errno reported to callers of the device surface.
    pub const fn errno(&self) -> i32 {
        match self {
            Self::InvalidInput => -EINVAL,
            Self::ResourceExhausted => -ENOMEM,
            Self::Busy => -EAGAIN,
            Self::IoFault { .. } => -EIO,
            Self::NoDevice => -ENODEV,
        }
    }
}

impl From<WorkAreaError> for VpdError {
    fn from(_: WorkAreaError) -> Self {
        Self::ResourceExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(VpdError::InvalidInput.errno(), -22);
        assert_eq!(VpdError::ResourceExhausted.errno(), -12);
        assert_eq!(VpdError::Busy.errno(), -11);
        assert_eq!(VpdError::IoFault { status: -1 }.errno(), -5);
        assert_eq!(VpdError::NoDevice.errno(), -19);
    }

    #[test]
    fn test_work_area_errors_are_resource_exhaustion() {
        let err: VpdError = WorkAreaError::OutOfMemory { granules: 4 }.into();
        assert_eq!(err, VpdError::ResourceExhausted);
    }
}
