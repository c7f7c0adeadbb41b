//! PAPR VPD retrieval
//!
//! Fetches Vital Product Data for a hardware location from platform firmware
//! through the chunked `ibm,get-vpd` call, and exports the result as a
//! read-only stream.
//!
//! # Architecture
//!
//! ```text
//! VpdDevice::create_handle
//!   └─ Retriever::retrieve       validate, then begin/advance/end
//!        └─ Sequence             lock + work areas, one per retrieval
//!             └─ call::get_vpd   one chunk, busy retries, status mapping
//!                  └─ Firmware   ibm,get-vpd (real or SimulatedFirmware)
//! ```
//!
//! Firmware keeps the position of the current sequence internally, so only
//! one sequence may run at a time. [`SequenceLock`] enforces that from
//! [`Sequence::begin`] to [`Sequence::end`].
//!
//! # Usage
//!
//! ```
//! use papr_vpd::{Retriever, SimulatedFirmware, VpdConfig};
//! use rtas_work_area::WorkAreaPool;
//!
//! let fw = SimulatedFirmware::new();
//! fw.insert("U78DA.ND0.WZS004K-P0", b"VPD");
//! let pool = WorkAreaPool::with_default_arena().unwrap();
//! let retriever = Retriever::new(fw, pool, VpdConfig::default());
//!
//! let vpd = retriever.retrieve(&"U78DA.ND0.WZS004K-P0".parse().unwrap()).unwrap();
//! assert_eq!(vpd, b"VPD");
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod blob;
pub mod call;
pub mod config;
pub mod error;
pub mod handle;
pub mod location;
pub mod lock;
pub mod retrieve;
pub mod sequence;
pub mod sim;

pub use call::{ChunkStatus, Firmware, GetVpdArgs, GetVpdRets, RtasStatus};
pub use config::{BusyPolicy, VpdConfig, VPD_WORK_AREA_SIZE};
pub use error::{Result, VpdError};
pub use handle::{VpdDevice, VpdHandle};
pub use location::{LocationCode, LocationCodeBuf, VpdHandleRequest, LOC_CODE_LEN};
pub use lock::{SequenceGuard, SequenceLock};
pub use retrieve::Retriever;
pub use sequence::{Sequence, SequenceState};
pub use sim::SimulatedFirmware;
