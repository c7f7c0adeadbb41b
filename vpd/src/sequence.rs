//! Retrieval sequence state machine.
//!
//! ```text
//! begin ──► Initial ──advance──► Advancing ──advance──► Advancing ...
//!                                    │                      │
//!                                    ▼                      ▼
//!                              Done (complete)        Failed (error)
//! ```
//!
//! A [`Sequence`] owns everything the firmware call touches: the exclusivity
//! guard, a work area holding the location code, and a work area receiving
//! each chunk. All three are scoped; dropping the sequence (normally via
//! [`Sequence::end`], or by unwinding) releases the work areas and then the
//! lock.

use log::debug;
use rtas_work_area::{WorkAreaAllocator, WorkAreaBuf};

use crate::call::{get_vpd, ChunkStatus, Firmware, GetVpdParams};
use crate::config::{BusyPolicy, VpdConfig};
use crate::error::{Result, VpdError};
use crate::location::{LocationCode, LOC_CODE_LEN};
use crate::lock::{SequenceGuard, SequenceLock};

/// Where a sequence stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    /// No chunk call issued yet.
    Initial,
    /// Last call returned a chunk and more remain.
    Advancing,
    /// Last call returned the final chunk.
    Done,
    /// An error was recorded.
    Failed(VpdError),
}

/// One in-flight VPD retrieval.
// Field order is drop order: work areas go back to the pool before the
// lock is released.
pub struct Sequence<'a, F, A>
where
    F: Firmware + ?Sized,
    A: WorkAreaAllocator + 'a,
{
    loc_code_area: A::Area<'a>,
    work_area: A::Area<'a>,
    firmware: &'a F,
    location: LocationCode,
    busy: BusyPolicy,
    params: GetVpdParams,
    error: Option<VpdError>,
    _guard: SequenceGuard<'a>,
}

impl<'a, F, A> Sequence<'a, F, A>
where
    F: Firmware + ?Sized,
    A: WorkAreaAllocator + 'a,
{
    /// Start a sequence for `location`.
    ///
    /// Blocks until `lock` is free. On allocation failure nothing is held
    /// afterwards.
    pub fn begin(
        lock: &'a SequenceLock,
        firmware: &'a F,
        allocator: &'a A,
        config: &VpdConfig,
        location: &LocationCode,
    ) -> Result<Self> {
        let guard = lock.lock();

        let mut loc_code_area = allocator.alloc(LOC_CODE_LEN)?;
        loc_code_area.as_mut_slice()[..LOC_CODE_LEN].copy_from_slice(location.wire());
        let work_area = allocator.alloc(config.work_area_size as usize)?;

        debug!(
            "vpd sequence begin: loc={} work_area={:#x}/{}",
            location,
            work_area.phys(),
            work_area.size()
        );

        Ok(Self {
            loc_code_area,
            work_area,
            firmware,
            location: *location,
            busy: config.busy,
            params: GetVpdParams::new(),
            error: None,
            _guard: guard,
        })
    }

    pub fn location(&self) -> &LocationCode {
        &self.location
    }

    /// Current state.
    pub fn state(&self) -> SequenceState {
        if let Some(err) = self.error {
            return SequenceState::Failed(err);
        }
        match self.params.status {
            None => SequenceState::Initial,
            Some(ChunkStatus::Complete) => SequenceState::Done,
            Some(_) => SequenceState::Advancing,
        }
    }

    /// True once the final chunk has been fetched or an error recorded.
    ///
    /// A fresh sequence is not done, even though nothing has been written.
    pub fn done(&self) -> bool {
        matches!(
            self.state(),
            SequenceState::Done | SequenceState::Failed(_)
        )
    }

    /// Fetch the next chunk into the work area.
    ///
    /// Returns `false` without calling firmware if the sequence is done.
    /// Otherwise returns whether the call produced a chunk; on failure the
    /// error is recorded and the sequence becomes done.
    pub fn advance(&mut self) -> bool {
        if self.done() {
            return false;
        }

        match get_vpd(
            self.firmware,
            &self.loc_code_area,
            &mut self.work_area,
            &mut self.params,
            &self.busy,
        ) {
            Ok(_) => true,
            Err(err) => {
                self.error = Some(err);
                false
            }
        }
    }

    /// Chunk written by the last successful [`advance`](Self::advance).
    pub fn buffer(&self) -> &[u8] {
        match self.params.status {
            Some(status) if status.is_success() => {
                &self.work_area.as_slice()[..self.params.written as usize]
            }
            _ => &[],
        }
    }

    /// Record a terminal error raised outside the firmware call.
    ///
    /// The first recorded error wins.
    pub fn set_error(&mut self, err: VpdError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn error(&self) -> Option<VpdError> {
        self.error
    }

    /// Release the work areas and the lock, returning the recorded error.
    pub fn end(self) -> Result<()> {
        debug!(
            "vpd sequence end: loc={} state={:?}",
            self.location,
            self.state()
        );
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<'a, F, A> core::fmt::Debug for Sequence<'a, F, A>
where
    F: Firmware + ?Sized,
    A: WorkAreaAllocator + 'a,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sequence")
            .field("location", &self.location)
            .field("sequence", &self.params.sequence)
            .field("written", &self.params.written)
            .field("state", &self.state())
            .finish()
    }
}
