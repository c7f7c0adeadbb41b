//! Growable VPD blob.
//!
//! Accumulates successive ibm,get-vpd chunks into one buffer. Storage is
//! absent until the first non-empty append and is handed out exactly once
//! by [`Blob::detach`], which consumes the blob so nothing can be appended
//! afterwards.

use alloc::vec::Vec;

use crate::error::{Result, VpdError};

/// Accumulated VPD bytes.
#[derive(Debug)]
pub struct Blob {
    /// `None` iff the blob is empty.
    data: Option<Vec<u8>>,
    /// Most bytes the blob may hold.
    limit: usize,
}

impl Default for Blob {
    fn default() -> Self {
        Self::new()
    }
}

impl Blob {
    /// Empty blob, no storage attached.
    pub const fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Empty blob that refuses to grow past `limit` bytes.
    pub const fn with_limit(limit: usize) -> Self {
        Self { data: None, limit }
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    /// True when nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Append `bytes` to the end of the blob.
    ///
    /// The first append allocates storage sized exactly to its input; later
    /// ones grow by exactly the appended length. On allocation failure the
    /// blob is left as it was, as it is when the append would exceed the
    /// limit.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        match self.len().checked_add(bytes.len()) {
            Some(total) if total <= self.limit => {}
            _ => return Err(VpdError::ResourceExhausted),
        }

        match &mut self.data {
            None => {
                let mut fresh = Vec::new();
                fresh
                    .try_reserve_exact(bytes.len())
                    .map_err(|_| VpdError::ResourceExhausted)?;
                fresh.extend_from_slice(bytes);
                self.data = Some(fresh);
            }
            Some(data) => {
                data.try_reserve_exact(bytes.len())
                    .map_err(|_| VpdError::ResourceExhausted)?;
                data.extend_from_slice(bytes);
            }
        }
        Ok(())
    }

    /// Hand the accumulated bytes to the caller.
    ///
    /// An empty blob detaches to an empty `Vec` without allocating.
    pub fn detach(self) -> Vec<u8> {
        self.data.unwrap_or_default()
    }
}
