//! Handle export.
//!
//! [`VpdDevice`] is the surface callers talk to: they hand in a
//! [`VpdHandleRequest`] naming a location, and get back a [`VpdHandle`], a
//! read-only, non-seekable stream over that location's complete VPD. The
//! request is updated in place with the handle id and the VPD length.
//!
//! The whole blob is retrieved before the handle exists, so reads never
//! touch firmware and never hold the sequence lock.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicI32, Ordering};

use log::{debug, info, warn};
use rtas_work_area::WorkAreaAllocator;

use crate::call::Firmware;
use crate::error::{Result, VpdError};
use crate::location::VpdHandleRequest;
use crate::retrieve::Retriever;

/// First handle id handed out.
const FIRST_HANDLE_ID: i32 = 3;

/// VPD device bound to one firmware channel.
#[derive(Debug)]
pub struct VpdDevice<F, A> {
    retriever: Retriever<F, A>,
    next_id: AtomicI32,
}

impl<F, A> VpdDevice<F, A>
where
    F: Firmware,
    A: WorkAreaAllocator,
{
    /// Bring up the device, if firmware implements ibm,get-vpd.
    pub fn probe(retriever: Retriever<F, A>) -> Result<Self> {
        if !retriever.firmware().implements_get_vpd() {
            info!("ibm,get-vpd not implemented, no VPD device");
            return Err(VpdError::NoDevice);
        }
        info!("VPD device ready");
        Ok(Self {
            retriever,
            next_id: AtomicI32::new(FIRST_HANDLE_ID),
        })
    }

    pub fn retriever(&self) -> &Retriever<F, A> {
        &self.retriever
    }

    /// Retrieve the VPD named by `req` and return a stream over it.
    ///
    /// On success `req.fd` and `req.size` are filled in. On failure `req`
    /// is left untouched.
    pub fn create_handle(&self, req: &mut VpdHandleRequest) -> Result<VpdHandle> {
        let location = req.validate()?;
        let data = self.retriever.retrieve_location(&location)?;
        let size = reported_size(data.len())?;
        let id = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .map_err(|_| {
                warn!("vpd handle ids exhausted");
                VpdError::ResourceExhausted
            })?;
        debug!("vpd handle {} for {}: {} bytes", id, location, size);

        req.fd = id;
        req.size = size;
        Ok(VpdHandle { id, data, pos: 0 })
    }
}

/// VPD length as carried in [`VpdHandleRequest::size`].
fn reported_size(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| VpdError::ResourceExhausted)
}

/// Read-only stream over one location's VPD.
///
/// Dropping the handle frees the data, read or not.
#[derive(Debug)]
pub struct VpdHandle {
    id: i32,
    data: Vec<u8>,
    pos: usize,
}

impl VpdHandle {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Total VPD length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Copy the next bytes into `buf`. Returns 0 at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

#[cfg(feature = "std")]
impl std::io::Read for VpdHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(VpdHandle::read(self, buf))
    }
}

#[cfg(feature = "std")]
impl std::io::Seek for VpdHandle {
    fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "VPD handles are not seekable",
        ))
    }
}
