use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    error::{PkiError, Result},
    types::SerialNumber,
};

/// Source of certificate serial numbers.
///
/// Two calls never return the same value; the registry still rejects a
/// duplicate so a collision surfaces as `DuplicateSerial` instead of a
/// silently shadowed record.
pub trait SerialAllocator: Send + Sync {
    fn next(&self) -> Result<SerialNumber>;
}

/// 128-bit random serials drawn from the OS CSPRNG.
///
/// The top bit of the first byte is cleared so the DER INTEGER stays
/// positive, and the first byte is non-zero so the encoding is minimal
/// (at least 120 bits of entropy).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSerials;

impl RandomSerials {
    pub const LEN: usize = 16;

    pub fn new() -> Self {
        Self
    }
}

impl SerialAllocator for RandomSerials {
    fn next(&self) -> Result<SerialNumber> {
        let mut bytes = [0u8; Self::LEN];
        loop {
            getrandom::fill(&mut bytes)
                .map_err(|e| PkiError::Storage(format!("OS random source failed: {e}")))?;
            bytes[0] &= 0x7f;
            if bytes[0] != 0 {
                break;
            }
        }
        SerialNumber::from_bytes(&bytes)
    }
}

/// Bounded counter, mostly useful to force collisions in tests.
///
/// Yields `start ..= max` and then fails with `AllocatorExhausted`.
#[derive(Debug)]
pub struct SequentialSerials {
    next: AtomicU64,
    max: u64,
}

impl SequentialSerials {
    pub fn new(start: u64, max: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
            max,
        }
    }
}

impl SerialAllocator for SequentialSerials {
    fn next(&self) -> Result<SerialNumber> {
        let value = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current <= self.max {
                    current.checked_add(1)
                } else {
                    None
                }
            })
            .map_err(|_| PkiError::AllocatorExhausted)?;
        SerialNumber::from_bytes(&value.to_be_bytes())
    }
}
