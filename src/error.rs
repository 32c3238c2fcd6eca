//! Error tiers for the pool engines
//!
//! Design: two tiers that never mix.
//! 1. `PoolError` - capacity and configuration failures, returned through `Result`
//! 2. `ProtocolViolation` - caller broke the allocator's invariants (double
//!    allocate, double free, bad index). Routed through a `ViolationPolicy`
//!    that decides between abort, panic and a counted no-op.

use serde::{Deserialize, Serialize};
use tracing::error;

/// Recoverable failures: the caller picks another size class or gives up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Backing allocator refused a request
    OutOfMemory { bytes: usize },
    /// `num_elements * element_size` does not fit in `usize`
    SizeOverflow { num_elements: usize, element_size: usize },
    /// Pool set already holds its maximum number of pools
    CapacityReached { capacity: usize },
    /// Pool set has been terminated
    Terminated,
}

impl core::fmt::Display for PoolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory { bytes } => {
                write!(f, "Backing allocator could not provide {} bytes", bytes)
            }
            Self::SizeOverflow { num_elements, element_size } => {
                write!(f, "Pool of {} elements of {} bytes overflows usize", num_elements, element_size)
            }
            Self::CapacityReached { capacity } => {
                write!(f, "Pool set already holds {} pools", capacity)
            }
            Self::Terminated => write!(f, "Pool set has been terminated"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Fatal tier: the occupancy bitmap would be corrupted if the operation ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    DoubleAllocation { index: usize },
    DoubleFree { index: usize },
    IndexOutOfRange { index: usize, num_elements: usize },
}

impl core::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DoubleAllocation { index } => write!(f, "Multiple allocation of slot {}", index),
            Self::DoubleFree { index } => write!(f, "Multiple deallocation of slot {}", index),
            Self::IndexOutOfRange { index, num_elements } => {
                write!(f, "Slot {} out of range for pool of {} elements", index, num_elements)
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// What happens once a protocol violation has been counted and logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// Terminate the process immediately
    Abort,
    /// Unwind; lets a test harness observe the violation
    Panic,
    /// Leave state untouched and hand the violation back to the caller
    Ignore,
}

impl ViolationPolicy {
    /// Apply the policy. Only returns under `Ignore`.
    pub fn enforce(self, violation: ProtocolViolation) -> ProtocolViolation {
        error!(target: "poolset", policy = ?self, %violation, "protocol violation");
        match self {
            Self::Abort => std::process::abort(),
            Self::Panic => panic!("{}", violation),
            Self::Ignore => violation,
        }
    }
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(feature = "no-abort-on-error") {
            Self::Ignore
        } else {
            Self::Abort
        }
    }
}
