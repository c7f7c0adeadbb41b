//! Firmware-addressable work area allocator.
//!
//! Firmware calls that fill caller memory (chunked VPD retrieval, system
//! parameter reads, ...) need their buffers inside a region the firmware can
//! address. This crate reserves one such region up front and hands out
//! short-lived slices of it.
//!
//! # Design
//!
//! - **One arena**: page-aligned, zeroed, identity mapped (phys == virt)
//! - **Granule tracking**: first-fit over 128-byte granules, spin-lock guarded
//! - **Scoped areas**: a [`WorkArea`] gives its granules back when dropped,
//!   so every exit path of a caller releases what it borrowed
//!
//! # Usage
//!
//! ```ignore
//! use rtas_work_area::{WorkAreaAllocator, WorkAreaBuf, WorkAreaPool};
//!
//! let pool = WorkAreaPool::with_default_arena()?;
//!
//! let mut area = pool.alloc(4096)?;
//! firmware_call(area.phys(), area.size());
//! let data = &area.as_slice()[..written];
//! // granules return to the pool here
//! ```

#![no_std]

extern crate alloc;

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;

use log::{debug, warn};
use spin::Mutex;

/// Page size (4KB). The arena is aligned to and sized in pages.
pub const PAGE_SIZE: usize = 4096;

/// Allocation granularity inside the arena.
pub const GRANULE: usize = 128;

/// Default arena size (64KB).
pub const DEFAULT_ARENA_SIZE: usize = 64 * 1024;

// ============================================================================
// Utility functions
// ============================================================================

/// Align a value up to the given alignment.
#[inline]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// [`align_up`] that reports overflow instead of wrapping.
#[inline]
pub const fn checked_align_up(val: usize, align: usize) -> Option<usize> {
    match val.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Align a value down to the given alignment.
#[inline]
pub const fn align_down(val: usize, align: usize) -> usize {
    val & !(align - 1)
}

/// Convert bytes to granules (rounded up).
#[inline]
pub const fn bytes_to_granules(bytes: usize) -> usize {
    align_up(bytes, GRANULE) / GRANULE
}

// ============================================================================
// Error types
// ============================================================================

/// Work area allocation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WorkAreaError {
    /// Requested 0 bytes.
    #[error("zero-sized work area requested")]
    ZeroSize,
    /// Request can never be satisfied by this arena.
    #[error("work area of {requested} bytes exceeds the {arena}-byte arena")]
    TooLarge { requested: usize, arena: usize },
    /// No contiguous free run large enough right now.
    #[error("no run of {granules} free granules in the arena")]
    OutOfMemory { granules: usize },
    /// Arena could not be reserved with the requested size.
    #[error("invalid arena size {0}")]
    InvalidArena(usize),
}

/// Result type for work area operations.
pub type Result<T> = core::result::Result<T, WorkAreaError>;

// ============================================================================
// Allocator seam
// ============================================================================

/// A borrowed, firmware-addressable buffer.
pub trait WorkAreaBuf {
    /// Address the firmware uses to reach the buffer.
    fn phys(&self) -> u64;

    /// Usable size in bytes (the size that was requested).
    fn size(&self) -> usize;

    /// Buffer contents.
    fn as_slice(&self) -> &[u8];

    /// Mutable buffer contents.
    fn as_mut_slice(&mut self) -> &mut [u8];
}

/// Source of work areas.
///
/// Release is tied to the lifetime of the returned area: dropping it frees
/// the memory, there is no separate free call to forget.
pub trait WorkAreaAllocator {
    /// Area handle type.
    type Area<'a>: WorkAreaBuf
    where
        Self: 'a;

    /// Allocate a zeroed work area of at least `size` bytes.
    fn alloc(&self, size: usize) -> Result<Self::Area<'_>>;
}

// ============================================================================
// WorkAreaPool
// ============================================================================

/// Granule bookkeeping, guarded by the pool lock.
struct PoolState {
    /// One flag per granule.
    used: Vec<bool>,
    /// Bytes currently handed out (granule-rounded).
    in_use: usize,
}

impl PoolState {
    /// First-fit search for `count` contiguous free granules.
    fn find_run(&self, count: usize) -> Option<usize> {
        let mut run = 0usize;
        for (i, used) in self.used.iter().enumerate() {
            if *used {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                return Some(i + 1 - count);
            }
        }
        None
    }
}

/// Arena of firmware-addressable memory.
///
/// Shared between callers; allocation and release take a short spin lock.
pub struct WorkAreaPool {
    /// Arena base (phys == virt).
    base: NonNull<u8>,
    /// Arena size in bytes (page multiple).
    size: usize,
    state: Mutex<PoolState>,
}

// SAFETY: The arena is owned by the pool. Granule ownership is tracked
// under `state`, and each granule run is handed to at most one WorkArea.
unsafe impl Send for WorkAreaPool {}
unsafe impl Sync for WorkAreaPool {}

impl WorkAreaPool {
    /// Reserve an arena of `arena_size` bytes, rounded up to whole pages.
    pub fn new(arena_size: usize) -> Result<Self> {
        if arena_size == 0 {
            return Err(WorkAreaError::InvalidArena(arena_size));
        }

        let size = match checked_align_up(arena_size, PAGE_SIZE) {
            Some(size) if size != 0 => size,
            _ => return Err(WorkAreaError::InvalidArena(arena_size)),
        };
        let layout = Layout::from_size_align(size, PAGE_SIZE)
            .map_err(|_| WorkAreaError::InvalidArena(arena_size))?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(WorkAreaError::InvalidArena(arena_size))?;

        debug!("work area arena at {:#x}, {} bytes", base.as_ptr() as usize, size);

        Ok(Self {
            base,
            size,
            state: Mutex::new(PoolState {
                used: vec![false; size / GRANULE],
                in_use: 0,
            }),
        })
    }

    /// Reserve an arena of [`DEFAULT_ARENA_SIZE`].
    pub fn with_default_arena() -> Result<Self> {
        Self::new(DEFAULT_ARENA_SIZE)
    }

    /// Total arena size in bytes.
    pub fn total_size(&self) -> usize {
        self.size
    }

    /// Bytes currently handed out.
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    /// Bytes not currently handed out (may be fragmented).
    pub fn free_space(&self) -> usize {
        self.size - self.in_use()
    }

    /// Arena base address.
    pub fn base_address(&self) -> u64 {
        self.base.as_ptr() as u64
    }

    /// Allocate a zeroed work area.
    pub fn alloc(&self, size: usize) -> Result<WorkArea<'_>> {
        if size == 0 {
            return Err(WorkAreaError::ZeroSize);
        }
        if size > self.size {
            return Err(WorkAreaError::TooLarge {
                requested: size,
                arena: self.size,
            });
        }

        let granules = bytes_to_granules(size);

        let first = {
            let mut state = self.state.lock();
            let Some(first) = state.find_run(granules) else {
                warn!(
                    "work area arena exhausted: {} bytes requested, {} in use",
                    size, state.in_use
                );
                return Err(WorkAreaError::OutOfMemory { granules });
            };
            for used in &mut state.used[first..first + granules] {
                *used = true;
            }
            state.in_use += granules * GRANULE;
            first
        };

        let offset = first * GRANULE;
        // SAFETY: offset + granules * GRANULE lies inside the arena, and the
        // run was just marked used so nobody else can reach it.
        let ptr = unsafe {
            let ptr = self.base.as_ptr().add(offset);
            core::ptr::write_bytes(ptr, 0, granules * GRANULE);
            NonNull::new_unchecked(ptr)
        };

        Ok(WorkArea {
            pool: self,
            ptr,
            first,
            granules,
            size,
        })
    }

    fn release(&self, first: usize, granules: usize) {
        let mut state = self.state.lock();
        for used in &mut state.used[first..first + granules] {
            debug_assert!(*used, "BUG: releasing a free granule");
            *used = false;
        }
        state.in_use -= granules * GRANULE;
    }
}

impl WorkAreaAllocator for WorkAreaPool {
    type Area<'a> = WorkArea<'a>;

    fn alloc(&self, size: usize) -> Result<WorkArea<'_>> {
        WorkAreaPool::alloc(self, size)
    }
}

impl Drop for WorkAreaPool {
    fn drop(&mut self) {
        // SAFETY: same size/alignment that `new` validated and allocated with.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.size, PAGE_SIZE);
            dealloc(self.base.as_ptr(), layout);
        }
    }
}

impl core::fmt::Debug for WorkAreaPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkAreaPool")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("size", &format_args!("{:#x}", self.size))
            .field("in_use", &self.in_use())
            .finish()
    }
}

// ============================================================================
// WorkArea
// ============================================================================

/// A run of granules borrowed from a [`WorkAreaPool`].
///
/// Returned to the pool on drop.
pub struct WorkArea<'p> {
    pool: &'p WorkAreaPool,
    ptr: NonNull<u8>,
    first: usize,
    granules: usize,
    size: usize,
}

// SAFETY: the granule run is exclusively owned by this handle.
unsafe impl Send for WorkArea<'_> {}

impl WorkAreaBuf for WorkArea<'_> {
    #[inline]
    fn phys(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `size` bytes from `ptr` are inside our exclusive run.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` rules out other borrows.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for WorkArea<'_> {
    fn drop(&mut self) {
        self.pool.release(self.first, self.granules);
    }
}

impl core::fmt::Debug for WorkArea<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkArea")
            .field("phys", &format_args!("{:#x}", self.phys()))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_functions() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_down(4097, 4096), 4096);
        assert_eq!(bytes_to_granules(1), 1);
        assert_eq!(bytes_to_granules(128), 1);
        assert_eq!(bytes_to_granules(129), 2);
    }

    #[test]
    fn test_arena_rounded_to_pages() {
        let pool = WorkAreaPool::new(5000).unwrap();
        assert_eq!(pool.total_size(), 2 * PAGE_SIZE);
        assert_eq!(pool.base_address() % PAGE_SIZE as u64, 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_zero_arena_rejected() {
        assert_eq!(WorkAreaPool::new(0).unwrap_err(), WorkAreaError::InvalidArena(0));
    }

    #[test]
    fn test_alloc_is_zeroed_and_inside_arena() {
        let pool = WorkAreaPool::new(PAGE_SIZE).unwrap();
        {
            let mut area = pool.alloc(100).unwrap();
            area.as_mut_slice().fill(0xAA);
        }
        let area = pool.alloc(100).unwrap();
        assert_eq!(area.size(), 100);
        assert!(area.as_slice().iter().all(|b| *b == 0));

        let base = pool.base_address();
        assert!(area.phys() >= base);
        assert!(area.phys() + area.size() as u64 <= base + pool.total_size() as u64);
    }

    #[test]
    fn test_in_use_rounds_to_granules() {
        let pool = WorkAreaPool::new(PAGE_SIZE).unwrap();
        let area = pool.alloc(80).unwrap();
        assert_eq!(pool.in_use(), GRANULE);
        drop(area);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.free_space(), PAGE_SIZE);
    }

    #[test]
    fn test_areas_do_not_overlap() {
        let pool = WorkAreaPool::new(PAGE_SIZE).unwrap();
        let a = pool.alloc(200).unwrap();
        let b = pool.alloc(200).unwrap();
        let (lo, hi) = if a.phys() < b.phys() { (&a, &b) } else { (&b, &a) };
        assert!(lo.phys() + bytes_to_granules(lo.size()) as u64 * GRANULE as u64 <= hi.phys());
    }

    #[test]
    fn test_exhaustion_and_release() {
        let pool = WorkAreaPool::new(PAGE_SIZE).unwrap();
        let full = pool.alloc(PAGE_SIZE).unwrap();
        assert_eq!(
            pool.alloc(1).unwrap_err(),
            WorkAreaError::OutOfMemory { granules: 1 }
        );
        drop(full);
        assert!(pool.alloc(PAGE_SIZE).is_ok());
    }

    #[test]
    fn test_first_fit_reuses_hole() {
        let pool = WorkAreaPool::new(PAGE_SIZE).unwrap();
        let a = pool.alloc(GRANULE).unwrap();
        let b = pool.alloc(GRANULE).unwrap();
        let a_phys = a.phys();
        drop(a);
        let c = pool.alloc(GRANULE).unwrap();
        assert_eq!(c.phys(), a_phys);
        drop(b);
    }

    #[test]
    fn test_huge_arena_rejected() {
        for size in [usize::MAX, usize::MAX - 10, usize::MAX - PAGE_SIZE + 2] {
            assert_eq!(
                WorkAreaPool::new(size).unwrap_err(),
                WorkAreaError::InvalidArena(size)
            );
        }
        // Rounds without overflow, but no layout can describe it.
        let size = usize::MAX - 2 * PAGE_SIZE;
        assert_eq!(
            WorkAreaPool::new(size).unwrap_err(),
            WorkAreaError::InvalidArena(size)
        );
    }

    #[test]
    fn test_checked_align_up() {
        assert_eq!(checked_align_up(1, PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(checked_align_up(PAGE_SIZE, PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(checked_align_up(usize::MAX - 10, PAGE_SIZE), None);
    }

    #[test]
    fn test_request_errors() {
        let pool = WorkAreaPool::new(PAGE_SIZE).unwrap();
        assert_eq!(pool.alloc(0).unwrap_err(), WorkAreaError::ZeroSize);
        assert_eq!(
            pool.alloc(PAGE_SIZE + 1).unwrap_err(),
            WorkAreaError::TooLarge {
                requested: PAGE_SIZE + 1,
                arena: PAGE_SIZE
            }
        );
    }

    #[test]
    fn test_allocator_trait() {
        fn grab<A: WorkAreaAllocator>(a: &A) -> usize {
            let area = a.alloc(64).unwrap();
            area.size()
        }
        let pool = WorkAreaPool::with_default_arena().unwrap();
        assert_eq!(grab(&pool), 64);
        assert_eq!(pool.in_use(), 0);
    }
}
