//! Common test utilities and mock firmware
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use std::time::Duration;

use papr_vpd::{
    BusyPolicy, Firmware, GetVpdArgs, GetVpdRets, Retriever, SimulatedFirmware, VpdConfig,
};
use rtas_work_area::WorkAreaPool;

/// One scripted firmware answer
#[derive(Debug, Clone)]
pub struct Step {
    pub status: i32,
    pub chunk: Vec<u8>,
    /// Reported bytes written; defaults to `chunk.len()`
    pub written: Option<u32>,
}

impl Step {
    pub fn more(chunk: &[u8]) -> Self {
        Self { status: 1, chunk: chunk.to_vec(), written: None }
    }

    pub fn complete(chunk: &[u8]) -> Self {
        Self { status: 0, chunk: chunk.to_vec(), written: None }
    }

    pub fn status(status: i32) -> Self {
        Self { status, chunk: Vec::new(), written: None }
    }

    /// Claim `written` bytes regardless of what was actually copied
    pub fn lying(status: i32, written: u32) -> Self {
        Self { status, chunk: Vec::new(), written: Some(written) }
    }
}

/// Firmware that replays a fixed script and records what it was called with
#[derive(Debug, Default)]
pub struct ScriptedFirmware {
    script: Mutex<VecDeque<Step>>,
    sequences: Mutex<Vec<u32>>,
    next_sequence: AtomicUsize,
}

impl ScriptedFirmware {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            sequences: Mutex::new(Vec::new()),
            next_sequence: AtomicUsize::new(100),
        }
    }

    /// Sequence numbers presented, in call order
    pub fn sequences(&self) -> Vec<u32> {
        self.sequences.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sequences.lock().unwrap().len()
    }

    /// Append more steps (e.g. for a second retrieval)
    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }
}

impl Firmware for ScriptedFirmware {
    fn ibm_get_vpd(&self, args: GetVpdArgs<'_>) -> GetVpdRets {
        self.sequences.lock().unwrap().push(args.sequence);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("firmware called more often than scripted");

        args.work_area[..step.chunk.len()].copy_from_slice(&step.chunk);
        GetVpdRets {
            status: step.status,
            next_sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed) as u32,
            written: step.written.unwrap_or(step.chunk.len() as u32),
        }
    }
}

/// Wraps [`SimulatedFirmware`] and flags any call that interleaves with
/// another thread's sequence
#[derive(Debug, Default)]
pub struct RecordingFirmware {
    inner: SimulatedFirmware,
    owner: Mutex<Option<ThreadId>>,
    overlapped: AtomicBool,
    sequences_started: AtomicUsize,
}

impl RecordingFirmware {
    pub fn new(inner: SimulatedFirmware) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &SimulatedFirmware {
        &self.inner
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn sequences_started(&self) -> usize {
        self.sequences_started.load(Ordering::SeqCst)
    }
}

impl Firmware for RecordingFirmware {
    fn ibm_get_vpd(&self, args: GetVpdArgs<'_>) -> GetVpdRets {
        let me = thread::current().id();
        {
            let mut owner = self.owner.lock().unwrap();
            match *owner {
                Some(other) if other != me => self.overlapped.store(true, Ordering::SeqCst),
                Some(_) => {}
                None if args.sequence == 1 => {
                    self.sequences_started.fetch_add(1, Ordering::SeqCst);
                    *owner = Some(me);
                }
                None => self.overlapped.store(true, Ordering::SeqCst),
            }
        }

        // Widen the window for another thread to sneak in
        thread::sleep(Duration::from_micros(200));
        let rets = self.inner.ibm_get_vpd(args);

        if rets.status != 1 {
            *self.owner.lock().unwrap() = None;
        }
        rets
    }
}

/// Config that never sleeps on busy
pub fn test_config(max_busy_retries: u32) -> VpdConfig {
    VpdConfig::default().with_busy_policy(BusyPolicy::no_sleep(max_busy_retries))
}

/// Retriever over `fw` with a fresh default pool
pub fn retriever<F: Firmware>(fw: F) -> Retriever<F, WorkAreaPool> {
    let pool = WorkAreaPool::with_default_arena().expect("arena");
    Retriever::new(fw, pool, test_config(8))
}
