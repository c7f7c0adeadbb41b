//! Simulated ibm,get-vpd firmware.
//!
//! Serves VPD from an in-memory table, keeping per-sequence state the way
//! platform firmware does. Useful on hosts without PAPR firmware and as a
//! test double.
//!
//! Behaviour:
//! - sequence 1 starts a new stream (any stream in progress is abandoned)
//! - any other sequence must be the one the previous call returned, or the
//!   call fails with -4 (restart)
//! - unknown location code: -3
//! - empty location code: every entry, concatenated in location code order
//! - changing the table mid-stream invalidates the stream

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::call::{Firmware, GetVpdArgs, GetVpdRets};

const STATUS_COMPLETE: i32 = 0;
const STATUS_MORE_DATA: i32 = 1;
const STATUS_PARAMETER_ERROR: i32 = -3;
const STATUS_RESTART: i32 = -4;

/// First sequence number handed out for a continuation.
const FIRST_TOKEN: u32 = 0x1000;

struct Stream {
    loc_code: Vec<u8>,
    data: Vec<u8>,
    offset: usize,
    expected: u32,
}

struct SimState {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    stream: Option<Stream>,
    busy_left: u32,
    busy_status: i32,
    next_token: u32,
}

impl SimState {
    fn token(&mut self) -> u32 {
        let token = self.next_token;
        self.next_token = match self.next_token.wrapping_add(1) {
            0 | 1 => FIRST_TOKEN,
            next => next,
        };
        token
    }

    fn lookup(&self, loc_code: &[u8]) -> Option<Vec<u8>> {
        if loc_code.is_empty() {
            return Some(self.entries.values().flatten().copied().collect());
        }
        self.entries.get(loc_code).cloned()
    }
}

/// In-memory ibm,get-vpd implementation.
pub struct SimulatedFirmware {
    implemented: AtomicBool,
    chunk_limit: usize,
    calls: AtomicUsize,
    state: Mutex<SimState>,
}

impl SimulatedFirmware {
    pub fn new() -> Self {
        Self {
            implemented: AtomicBool::new(true),
            chunk_limit: usize::MAX,
            calls: AtomicUsize::new(0),
            state: Mutex::new(SimState {
                entries: BTreeMap::new(),
                stream: None,
                busy_left: 0,
                busy_status: -2,
                next_token: FIRST_TOKEN,
            }),
        }
    }

    /// Write at most `limit` bytes per call, even if the work area is larger.
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit.max(1);
        self
    }

    /// Set the VPD for `loc_code`, replacing any previous data.
    pub fn insert(&self, loc_code: &str, data: &[u8]) {
        let mut state = self.state.lock();
        state.entries.insert(loc_code.as_bytes().to_vec(), data.to_vec());
        state.stream = None;
    }

    /// Remove the VPD for `loc_code`.
    pub fn remove(&self, loc_code: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        state.stream = None;
        state.entries.remove(loc_code.as_bytes())
    }

    /// Answer the next `count` calls with `status` (-2 or 9900..=9905).
    pub fn inject_busy(&self, count: u32, status: i32) {
        let mut state = self.state.lock();
        state.busy_left = count;
        state.busy_status = status;
    }

    pub fn set_implemented(&self, implemented: bool) {
        self.implemented.store(implemented, Ordering::Relaxed);
    }

    /// Total calls made, busy answers included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedFirmware {
    fn default() -> Self {
        Self::new()
    }
}

impl Firmware for SimulatedFirmware {
    fn implements_get_vpd(&self) -> bool {
        self.implemented.load(Ordering::Relaxed)
    }

    fn ibm_get_vpd(&self, args: GetVpdArgs<'_>) -> GetVpdRets {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        if state.busy_left > 0 {
            state.busy_left -= 1;
            return GetVpdRets {
                status: state.busy_status,
                ..GetVpdRets::default()
            };
        }

        let end = args
            .loc_code
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(args.loc_code.len());
        let loc_code = &args.loc_code[..end];

        let mut stream = match args.sequence {
            0 => return error(STATUS_PARAMETER_ERROR),
            1 => {
                state.stream = None;
                match state.lookup(loc_code) {
                    Some(data) => Stream {
                        loc_code: loc_code.to_vec(),
                        data,
                        offset: 0,
                        expected: 1,
                    },
                    None => return error(STATUS_PARAMETER_ERROR),
                }
            }
            seq => match state.stream.take() {
                Some(s) if s.expected == seq && s.loc_code == loc_code => s,
                _ => return error(STATUS_RESTART),
            },
        };

        let remaining = stream.data.len() - stream.offset;
        let n = remaining.min(self.chunk_limit).min(args.work_area.len());
        args.work_area[..n].copy_from_slice(&stream.data[stream.offset..stream.offset + n]);
        stream.offset += n;

        if stream.offset == stream.data.len() {
            return GetVpdRets {
                status: STATUS_COMPLETE,
                next_sequence: 0,
                written: n as u32,
            };
        }

        let token = state.token();
        stream.expected = token;
        state.stream = Some(stream);
        GetVpdRets {
            status: STATUS_MORE_DATA,
            next_sequence: token,
            written: n as u32,
        }
    }
}

fn error(status: i32) -> GetVpdRets {
    GetVpdRets {
        status,
        ..GetVpdRets::default()
    }
}

impl core::fmt::Debug for SimulatedFirmware {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedFirmware")
            .field("entries", &state.entries.len())
            .field("streaming", &state.stream.is_some())
            .field("calls", &self.calls())
            .finish()
    }
}
