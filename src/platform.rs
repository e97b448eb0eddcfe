//! CPU and clock sources used to stamp admitted instances.
//!
//! In a kernel build both come from axhal. Without axhal (user space, tests)
//! they come from a pair of atomics that tests set with [`set_mock_stamp`].
//! Either way [`stamp`] is safe on the hot path: no allocation, no blocking.

/// Where and when an instance was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub cpu: u32,
    /// Monotonic time in nanoseconds.
    pub timestamp_ns: u64,
}

#[cfg(feature = "axhal")]
mod source {
    #[inline]
    pub fn cpu() -> u32 {
        axhal::percpu::this_cpu_id() as u32
    }

    #[inline]
    pub fn timestamp_ns() -> u64 {
        axhal::time::monotonic_time().as_nanos() as u64
    }
}

#[cfg(not(feature = "axhal"))]
mod source {
    use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    pub(super) static CPU: AtomicU32 = AtomicU32::new(0);
    pub(super) static TIMESTAMP_NS: AtomicU64 = AtomicU64::new(1_000_000_000);

    #[inline]
    pub fn cpu() -> u32 {
        CPU.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn timestamp_ns() -> u64 {
        TIMESTAMP_NS.load(Ordering::Relaxed)
    }
}

/// Stamp for an instance admitted right now on this CPU.
#[inline]
pub fn stamp() -> Stamp {
    Stamp {
        cpu: source::cpu(),
        timestamp_ns: source::timestamp_ns(),
    }
}

/// Fix the values [`stamp`] returns. Only available without axhal.
#[cfg(not(feature = "axhal"))]
pub fn set_mock_stamp(cpu: u32, timestamp_ns: u64) {
    use core::sync::atomic::Ordering;

    source::CPU.store(cpu, Ordering::Relaxed);
    source::TIMESTAMP_NS.store(timestamp_ns, Ordering::Relaxed);
}

#[cfg(all(test, not(feature = "axhal")))]
mod tests {
    use super::*;

    #[test]
    fn test_mock_stamp() {
        set_mock_stamp(3, 5000);
        assert_eq!(
            stamp(),
            Stamp {
                cpu: 3,
                timestamp_ns: 5000
            }
        );

        set_mock_stamp(0, 1_000_000_000);
        assert_eq!(stamp().cpu, 0);
    }
}
