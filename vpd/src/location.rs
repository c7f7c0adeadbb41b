//! Location codes and handle requests.
//!
//! A location code names the hardware location whose VPD is wanted. On the
//! wire it is an 80-byte character buffer: at most 79 characters plus a
//! terminating NUL (PAPR converged location code length rule). The buffer
//! arrives from outside untrusted, so it is kept as a [`LocationCodeBuf`]
//! until [`LocationCodeBuf::validate`] proves it terminated and produces a
//! [`LocationCode`], the only form a retrieval sequence accepts.

use core::fmt;
use core::str::FromStr;

use crate::error::{Result, VpdError};

/// Location code buffer size, terminator included.
pub const LOC_CODE_LEN: usize = 80;

/// Maximum significant characters in a location code.
pub const MAX_LOC_CODE_CHARS: usize = LOC_CODE_LEN - 1;

/// Reserved words in a handle request.
pub const HANDLE_RESERVED_WORDS: usize = 5;

// ═══════════════════════════════════════════════════════════════════════════
// RAW BUFFER
// ═══════════════════════════════════════════════════════════════════════════

/// Raw location code buffer, as copied in from a caller.
///
/// Nothing is known about its contents; it may lack a terminator.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LocationCodeBuf {
    bytes: [u8; LOC_CODE_LEN],
}

impl LocationCodeBuf {
    /// All-zero buffer (the empty location code).
    pub const fn zeroed() -> Self {
        Self {
            bytes: [0; LOC_CODE_LEN],
        }
    }

    /// Wrap raw bytes without any checking.
    pub const fn from_bytes(bytes: [u8; LOC_CODE_LEN]) -> Self {
        Self { bytes }
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; LOC_CODE_LEN] {
        &self.bytes
    }

    /// Check for a NUL within the buffer.
    pub fn is_terminated(&self) -> bool {
        self.bytes.contains(&0)
    }

    /// Prove the buffer terminated.
    ///
    /// This is the only check applied to caller-supplied buffers; the
    /// contents before the terminator stay opaque.
    pub fn validate(&self) -> Result<LocationCode> {
        if !self.is_terminated() {
            return Err(VpdError::InvalidInput);
        }
        Ok(LocationCode { buf: *self })
    }
}

impl Default for LocationCodeBuf {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl FromStr for LocationCodeBuf {
    type Err = VpdError;

    fn from_str(s: &str) -> Result<Self> {
        LocationCode::new(s).map(|lc| lc.buf)
    }
}

impl fmt::Debug for LocationCodeBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.bytes.iter().position(|b| *b == 0);
        f.debug_struct("LocationCodeBuf")
            .field("text", &Printable(&self.bytes[..end.unwrap_or(LOC_CODE_LEN)]))
            .field("terminated", &end.is_some())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VALIDATED LOCATION CODE
// ═══════════════════════════════════════════════════════════════════════════

/// A location code known to be NUL-terminated within its buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LocationCode {
    buf: LocationCodeBuf,
}

impl LocationCode {
    /// Build a location code from text.
    ///
    /// Stricter than [`LocationCodeBuf::validate`]: the text must fit in 79
    /// characters and be printable ASCII (which also rules out NULs).
    pub fn new(s: &str) -> Result<Self> {
        let text = s.as_bytes();
        if text.len() > MAX_LOC_CODE_CHARS {
            return Err(VpdError::InvalidInput);
        }
        if !text.iter().all(|b| (0x20..=0x7e).contains(b)) {
            return Err(VpdError::InvalidInput);
        }

        let mut bytes = [0u8; LOC_CODE_LEN];
        bytes[..text.len()].copy_from_slice(text);
        Ok(Self {
            buf: LocationCodeBuf { bytes },
        })
    }

    /// The empty location code, which selects all VPD on the system.
    pub const fn all() -> Self {
        Self {
            buf: LocationCodeBuf::zeroed(),
        }
    }

    /// Significant bytes (before the terminator).
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .buf
            .bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(MAX_LOC_CODE_CHARS);
        &self.buf.bytes[..end]
    }

    /// Text form, if the significant bytes are UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    /// True for the "all VPD" location code.
    pub fn is_empty(&self) -> bool {
        self.buf.bytes[0] == 0
    }

    /// Full terminated buffer, as handed to firmware.
    pub const fn wire(&self) -> &[u8; LOC_CODE_LEN] {
        &self.buf.bytes
    }
}

impl From<LocationCode> for LocationCodeBuf {
    fn from(lc: LocationCode) -> Self {
        lc.buf
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Printable(self.as_bytes()), f)
    }
}

impl fmt::Debug for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationCode(\"{}\")", self)
    }
}

/// Render bytes as text, replacing anything unprintable with '.'.
struct Printable<'a>(&'a [u8]);

impl fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0 {
            let c = if (0x20..=0x7e).contains(&b) { b as char } else { '.' };
            fmt::Write::write_char(f, c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HANDLE REQUEST
// ═══════════════════════════════════════════════════════════════════════════

/// Handle request exchanged with the device surface.
///
/// The caller fills `loc_code` and leaves everything else zero; a successful
/// [`crate::VpdDevice::create_handle`] writes back `fd` and `size`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpdHandleRequest {
    /// Location to retrieve VPD for.
    pub loc_code: LocationCodeBuf,
    /// Out: handle id of the created stream.
    pub fd: i32,
    /// Out: total VPD length in bytes.
    pub size: u32,
    /// Must be zero.
    pub reserved: [u64; HANDLE_RESERVED_WORDS],
}

const _: () = assert!(core::mem::size_of::<VpdHandleRequest>() == 128);

impl VpdHandleRequest {
    /// Request for the given location.
    pub fn new(loc_code: LocationCode) -> Self {
        Self {
            loc_code: loc_code.into(),
            ..Self::default()
        }
    }

    /// Check the request before any firmware resource is touched.
    ///
    /// Requires a terminated location code and all reserved words zero.
    pub fn validate(&self) -> Result<LocationCode> {
        let loc_code = self.loc_code.validate()?;
        if self.reserved.iter().any(|w| *w != 0) {
            return Err(VpdError::InvalidInput);
        }
        Ok(loc_code)
    }
}
