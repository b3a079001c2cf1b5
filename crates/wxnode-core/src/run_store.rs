//! Persistent run record surviving deep sleep.
//!
//! The record lives in a small scratch region that keeps its contents across
//! deep sleep but not across power loss. The region is addressed in 4-byte
//! buckets; the record spans four whole buckets starting at a fixed offset so
//! that no field ever straddles a bucket boundary.
//!
//! Binary layout (one `u32` per bucket, little-endian when viewed as bytes):
//! - bucket 0: run counter (u32, wrapping)
//! - bucket 1: reserved slot (always written as zero)
//! - bucket 2: error code of the last completed cycle (i32)
//! - bucket 3: padding

use log::{debug, info};

/// Size of one addressable unit of the scratch region, in bytes.
pub const BUCKET_SIZE: usize = 4;

/// Number of buckets the scratch region provides.
pub const SCRATCH_BUCKETS: usize = 128;

/// First bucket available to user data. Lower buckets belong to the platform.
pub const USER_BUCKET_START: usize = 65;

/// Bucket offset at which the run record is stored.
pub const RECORD_BUCKET: usize = USER_BUCKET_START;

/// Buckets occupied by one [`RunRecord`].
pub const RECORD_BUCKETS: usize = 4;

const _: () = assert!(RECORD_BUCKET + RECORD_BUCKETS <= SCRATCH_BUCKETS);
const _: () = assert!(core::mem::size_of::<RunRecord>() == RECORD_BUCKETS * BUCKET_SIZE);

/// How the device came to be executing the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootKind {
    /// Woken from deep sleep; the scratch region holds the previous record.
    Wake,
    /// Power-on or reset; the scratch region holds undefined bits.
    Cold,
}

/// Fixed-layout record carried across the deep-sleep boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunRecord {
    /// Number of wake cycles since the last cold boot
    pub run_count: u32,
    reserved: u32,
    /// Error code of the previous completed cycle
    pub error_code: i32,
    _padding: u32,
}

impl RunRecord {
    pub const fn new(run_count: u32, error_code: i32) -> Self {
        Self {
            run_count,
            reserved: 0,
            error_code,
            _padding: 0,
        }
    }

    /// Encode the record as whole buckets.
    pub fn to_buckets(&self) -> [u32; RECORD_BUCKETS] {
        [
            self.run_count,
            self.reserved,
            self.error_code as u32,
            self._padding,
        ]
    }

    /// Decode a record from whole buckets.
    pub fn from_buckets(buckets: &[u32; RECORD_BUCKETS]) -> Self {
        Self {
            run_count: buckets[0],
            reserved: buckets[1],
            error_code: buckets[2] as i32,
            _padding: buckets[3],
        }
    }

    /// Converts the record to its 16-byte little-endian image.
    pub fn to_bytes(&self) -> [u8; RECORD_BUCKETS * BUCKET_SIZE] {
        let mut bytes = [0u8; RECORD_BUCKETS * BUCKET_SIZE];
        for (i, bucket) in self.to_buckets().iter().enumerate() {
            bytes[i * BUCKET_SIZE..(i + 1) * BUCKET_SIZE].copy_from_slice(&bucket.to_le_bytes());
        }
        bytes
    }
}

/// Bucket-addressed memory that keeps its contents across deep sleep.
///
/// Reads of a region that was never written return whatever the medium
/// holds; callers decide whether that content is trustworthy (see
/// [`BootKind`]).
pub trait ScratchMemory {
    /// Copy `out.len()` buckets starting at `bucket` into `out`.
    fn read_buckets(&self, bucket: usize, out: &mut [u32]);

    /// Write `data` starting at `bucket` in a single operation.
    fn write_buckets(&mut self, bucket: usize, data: &[u32]);
}

impl<const N: usize> ScratchMemory for [u32; N] {
    fn read_buckets(&self, bucket: usize, out: &mut [u32]) {
        out.copy_from_slice(&self[bucket..bucket + out.len()]);
    }

    fn write_buckets(&mut self, bucket: usize, data: &[u32]) {
        self[bucket..bucket + data.len()].copy_from_slice(data);
    }
}

impl<M: ScratchMemory + ?Sized> ScratchMemory for &mut M {
    fn read_buckets(&self, bucket: usize, out: &mut [u32]) {
        (**self).read_buckets(bucket, out)
    }

    fn write_buckets(&mut self, bucket: usize, data: &[u32]) {
        (**self).write_buckets(bucket, data)
    }
}

/// Run store keeping an in-memory copy of the record between load and save.
pub struct RunStore<M> {
    memory: M,
    record: RunRecord,
}

impl<M: ScratchMemory> RunStore<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            record: RunRecord::default(),
        }
    }

    /// Read the record from the scratch region.
    ///
    /// On a cold boot the region content is undefined, so the record is
    /// reset to all zeroes instead of being read.
    pub fn load(&mut self, boot: BootKind) -> RunRecord {
        self.record = match boot {
            BootKind::Wake => {
                let mut buckets = [0u32; RECORD_BUCKETS];
                self.memory.read_buckets(RECORD_BUCKET, &mut buckets);
                RunRecord::from_buckets(&buckets)
            }
            BootKind::Cold => {
                info!("Cold boot, starting from a zeroed run record");
                RunRecord::default()
            }
        };
        debug!("Loaded run record: {:?}", self.record);
        self.record
    }

    /// Write the in-memory record to the scratch region as one whole record.
    pub fn save(&mut self) {
        self.memory
            .write_buckets(RECORD_BUCKET, &self.record.to_buckets());
        debug!("Saved run record: {:?}", self.record);
    }

    /// Current in-memory record.
    pub fn record(&self) -> RunRecord {
        self.record
    }

    pub fn count(&self) -> u32 {
        self.record.run_count
    }

    /// Advance the run counter in memory only; persisted by [`Self::save`].
    pub fn increment_count(&mut self) {
        self.record.run_count = self.record.run_count.wrapping_add(1);
    }

    /// Set the run counter and persist the record immediately.
    pub fn set_count(&mut self, count: u32) {
        self.record.run_count = count;
        self.save();
    }

    pub fn error_code(&self) -> i32 {
        self.record.error_code
    }

    /// Overwrite the in-memory error code. Codes from earlier cycles are
    /// replaced, not merged.
    pub fn set_error_code(&mut self, code: i32) {
        self.record.error_code = code;
    }

    /// Give back the underlying memory, e.g. to carry it across a simulated sleep.
    pub fn into_inner(self) -> M {
        self.memory
    }
}
