//! Diagnostics snapshots for pools and pool sets
//!
//! Snapshots are plain values: where they end up (log, stdout, JSON file)
//! is the caller's choice. `render` produces the classic one-counter-per-line
//! report with a caller-supplied prefix.

use serde::Serialize;
use std::fmt::Write;

/// Counters of a single slot pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolDiagnostics {
    pub element_size: usize,
    pub num_elements: usize,
    /// Running count kept by the pool
    pub allocated: usize,
    /// Same quantity recomputed from the occupancy bitmap
    pub allocated_in_bitmap: usize,
    pub double_allocations: usize,
    pub double_frees: usize,
    pub allocations: usize,
    pub frees: usize,
    pub spills: usize,
}

impl PoolDiagnostics {
    /// Running count agrees with the bitmap
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.allocated == self.allocated_in_bitmap
    }

    pub fn render(&self, prefix: &str) -> String {
        let rows = [
            ("element_size", self.element_size),
            ("num_elements", self.num_elements),
            ("allocated", self.allocated),
            ("allocated_in_bitmap", self.allocated_in_bitmap),
            ("double_allocations", self.double_allocations),
            ("double_frees", self.double_frees),
            ("allocations", self.allocations),
            ("frees", self.frees),
            ("spills", self.spills),
        ];

        let mut out = String::new();
        for (label, value) in rows {
            let _ = writeln!(out, "{}{:<20}: {}", prefix, label, value);
        }
        out
    }
}

impl core::fmt::Display for PoolDiagnostics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.render(""))
    }
}

/// Counters of a pool set plus every pool it owns, in routing order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PoolSetDiagnostics {
    pub name: String,
    pub pools: Vec<PoolDiagnostics>,
    /// Slots still handed out across all pools
    pub total_allocated: usize,
    /// Full pools whose request a later pool satisfied or passed on
    pub spills_handled: usize,
    /// Requests served by the overflow allocator
    pub spills_to_overflow: usize,
    /// Frees routed to the overflow allocator
    pub frees_to_overflow: usize,
}

impl PoolSetDiagnostics {
    pub fn render(&self, prefix: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.name);

        for (index, pool) in self.pools.iter().enumerate() {
            let pool_prefix = format!("{}:{:2}:[{:6}]:", prefix, index, pool.element_size);
            out.push_str(&pool.render(&pool_prefix));
        }

        let rows = [
            ("total_allocated", self.total_allocated),
            ("spills_handled", self.spills_handled),
            ("spills_to_overflow", self.spills_to_overflow),
            ("frees_to_overflow", self.frees_to_overflow),
        ];
        for (label, value) in rows {
            let _ = writeln!(out, "{}:summary:{:<20}: {}", prefix, label, value);
        }
        out
    }

    /// Every pool's running count agrees with its bitmap
    pub fn is_consistent(&self) -> bool {
        self.pools.iter().all(PoolDiagnostics::is_consistent)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl core::fmt::Display for PoolSetDiagnostics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.render(""))
    }
}
