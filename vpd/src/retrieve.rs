//! Sequence orchestrator.
//!
//! [`Retriever::retrieve`] turns a caller-supplied location code into the
//! complete VPD blob for that location:
//!
//! 1. validate the location code (no lock, no work area)
//! 2. begin a [`Sequence`]
//! 3. advance and append each chunk until the sequence is done
//! 4. end the sequence, then detach the blob or discard it

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::debug;
use rtas_work_area::WorkAreaAllocator;

use crate::blob::Blob;
use crate::call::Firmware;
use crate::config::VpdConfig;
use crate::error::Result;
use crate::location::{LocationCode, LocationCodeBuf};
use crate::lock::SequenceLock;
use crate::sequence::Sequence;

/// VPD retrieval over one firmware channel.
pub struct Retriever<F, A> {
    firmware: F,
    allocator: A,
    lock: Arc<SequenceLock>,
    config: VpdConfig,
}

impl<F, A> Retriever<F, A>
where
    F: Firmware,
    A: WorkAreaAllocator,
{
    /// Retriever with its own sequence lock.
    pub fn new(firmware: F, allocator: A, config: VpdConfig) -> Self {
        Self::with_lock(firmware, allocator, config, Arc::new(SequenceLock::new()))
    }

    /// Retriever sharing `lock` with other users of the same firmware.
    pub fn with_lock(firmware: F, allocator: A, config: VpdConfig, lock: Arc<SequenceLock>) -> Self {
        Self {
            firmware,
            allocator,
            lock,
            config,
        }
    }

    pub fn sequence_lock(&self) -> &Arc<SequenceLock> {
        &self.lock
    }

    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn config(&self) -> &VpdConfig {
        &self.config
    }

    /// Retrieve all VPD for a raw location code buffer.
    ///
    /// An unterminated buffer fails with `InvalidInput` before the lock is
    /// touched or firmware is called.
    pub fn retrieve(&self, loc_code: &LocationCodeBuf) -> Result<Vec<u8>> {
        let location = loc_code.validate()?;
        self.retrieve_location(&location)
    }

    /// Retrieve all VPD for an already validated location code.
    pub fn retrieve_location(&self, location: &LocationCode) -> Result<Vec<u8>> {
        let mut blob = Blob::with_limit(self.config.max_vpd_size);

        let mut seq = Sequence::begin(
            &self.lock,
            &self.firmware,
            &self.allocator,
            &self.config,
            location,
        )?;
        while seq.advance() {
            if let Err(err) = blob.append(seq.buffer()) {
                seq.set_error(err);
                break;
            }
        }
        seq.end()?;

        debug!("retrieved {} bytes of VPD for {}", blob.len(), location);
        Ok(blob.detach())
    }
}

impl<F, A> core::fmt::Debug for Retriever<F, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Retriever")
            .field("lock", &self.lock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusyPolicy;
    use crate::error::VpdError;
    use crate::location::LOC_CODE_LEN;
    use crate::sim::SimulatedFirmware;
    use rtas_work_area::WorkAreaPool;

    fn retriever(fw: SimulatedFirmware) -> Retriever<SimulatedFirmware, WorkAreaPool> {
        let config = VpdConfig::default().with_busy_policy(BusyPolicy::no_sleep(4));
        Retriever::new(fw, WorkAreaPool::with_default_arena().unwrap(), config)
    }

    #[test]
    fn test_retrieve_multi_chunk() {
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let fw = SimulatedFirmware::new().with_chunk_limit(4096);
        fw.insert("U78DA-P1", &data);
        let r = retriever(fw);

        let out = r.retrieve(&"U78DA-P1".parse().unwrap()).unwrap();
        assert_eq!(out, data);
        assert_eq!(r.firmware().calls(), 3);
        assert!(!r.sequence_lock().is_locked());
        assert_eq!(r.allocator().in_use(), 0);
    }

    #[test]
    fn test_unterminated_never_reaches_firmware() {
        let r = retriever(SimulatedFirmware::new());
        let buf = LocationCodeBuf::from_bytes([b'U'; LOC_CODE_LEN]);
        let _held = r.sequence_lock().lock();

        // Would deadlock if validation came after the lock.
        assert_eq!(r.retrieve(&buf), Err(VpdError::InvalidInput));
        assert_eq!(r.firmware().calls(), 0);
    }

    #[test]
    fn test_unknown_location() {
        let r = retriever(SimulatedFirmware::new());
        let err = r.retrieve(&"U-NOPE".parse().unwrap()).unwrap_err();
        assert_eq!(err, VpdError::InvalidInput);
        assert!(!r.sequence_lock().is_locked());
    }

    #[test]
    fn test_empty_vpd() {
        let fw = SimulatedFirmware::new();
        fw.insert("U-EMPTY", &[]);
        let r = retriever(fw);
        let out = r.retrieve_location(&LocationCode::new("U-EMPTY").unwrap()).unwrap();
        assert!(out.is_empty());
        assert_eq!(r.firmware().calls(), 1);
    }

    #[test]
    fn test_busy_exhaustion() {
        let fw = SimulatedFirmware::new();
        fw.insert("U1", b"vpd");
        fw.inject_busy(5, -2);
        let r = retriever(fw);
        assert_eq!(r.retrieve(&"U1".parse().unwrap()), Err(VpdError::Busy));
        assert!(!r.sequence_lock().is_locked());
    }

    #[test]
    fn test_busy_within_budget() {
        let fw = SimulatedFirmware::new();
        fw.insert("U1", b"vpd");
        fw.inject_busy(4, 9901);
        let r = retriever(fw);
        assert_eq!(r.retrieve(&"U1".parse().unwrap()).unwrap(), b"vpd");
    }

    #[test]
    fn test_borrowed_firmware() {
        let fw = SimulatedFirmware::new().with_chunk_limit(2);
        fw.insert("U1", b"abcde");
        let r = Retriever::new(
            &fw,
            WorkAreaPool::with_default_arena().unwrap(),
            VpdConfig::default().with_busy_policy(BusyPolicy::no_sleep(0)),
        );

        assert_eq!(r.retrieve(&"U1".parse().unwrap()).unwrap(), b"abcde");
        assert_eq!(fw.calls(), 3);
        drop(r);
        fw.insert("U2", b"still usable");
    }

    #[test]
    fn test_oversized_vpd_discarded() {
        let fw = SimulatedFirmware::new().with_chunk_limit(4);
        fw.insert("U1", b"0123456789");
        let config = VpdConfig::default()
            .with_busy_policy(BusyPolicy::no_sleep(0))
            .with_max_vpd_size(6);
        let r = Retriever::new(fw, WorkAreaPool::with_default_arena().unwrap(), config);

        assert_eq!(
            r.retrieve(&"U1".parse().unwrap()),
            Err(VpdError::ResourceExhausted)
        );
        assert_eq!(r.firmware().calls(), 2);
        assert!(!r.sequence_lock().is_locked());
        assert_eq!(r.allocator().in_use(), 0);
    }

    #[test]
    fn test_shared_lock() {
        let lock = Arc::new(SequenceLock::new());
        let fw = SimulatedFirmware::new();
        fw.insert("U1", b"x");
        let r = Retriever::with_lock(
            fw,
            WorkAreaPool::with_default_arena().unwrap(),
            VpdConfig::default(),
            Arc::clone(&lock),
        );
        assert!(Arc::ptr_eq(r.sequence_lock(), &lock));

        let held = lock.lock();
        assert!(r.sequence_lock().try_lock().is_none());
        drop(held);
        assert_eq!(r.retrieve(&"U1".parse().unwrap()).unwrap(), b"x");
    }
}
