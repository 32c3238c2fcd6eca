//! poolset - deterministic, non-growing memory pools
//!
//! Fixed-size-class slot allocation for code that cannot afford general
//! heap allocation on its hot path.
//!
//! Design: two engines over an injected backing allocator.
//! 1. `SlotPool`: one size class, fixed slot count, bitmap occupancy
//! 2. `PoolSet`: ordered pools, routes by size, spills to the backing
//!
//! Single-threaded by construction: nothing here locks. Give each thread its
//! own set or serialize access externally.
//!
//! ```
//! use poolset::{PoolSet, SystemHeap};
//!
//! let mut pools = PoolSet::new("demo", SystemHeap);
//! pools.add_pool(64, 128).unwrap();
//! pools.add_pool(256, 32).unwrap();
//!
//! let ptr = pools.allocate(48).unwrap();
//! unsafe { pools.deallocate(ptr.as_ptr()) };
//! pools.terminate();
//! ```

pub mod backing;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod pool;
pub mod pool_set;

pub use backing::{Arena, BackingAllocator, SystemHeap};
pub use config::{ConfigError, PoolConfig, PoolSetConfig};
pub use diagnostics::{PoolDiagnostics, PoolSetDiagnostics};
pub use error::{PoolError, ProtocolViolation, ViolationPolicy};
pub use pool::SlotPool;
pub use pool_set::{Owner, PoolSet, SlotHandle, DEFAULT_CAPACITY};
