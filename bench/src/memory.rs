//! Heap profiling for benchmark workloads via dhat.
//!
//! Profiling adds overhead and only records when built with `--features memory_profiling`. The
//! detailed profile lands in `dhat-heap.json`; load it into
//! <https://nnethercote.github.io/dh_view/dh_view.html>.

use std::fmt;

/// Heap activity recorded over one measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total bytes allocated.
    pub bytes_allocated: u64,
    /// Total number of allocations.
    pub allocation_count: u64,
    /// Peak heap usage in bytes.
    pub peak_bytes: u64,
}

impl MemoryStats {
    /// Bytes allocated per entity, zero for an empty workload.
    pub fn bytes_per_entity(&self, entities: usize) -> f64 {
        per(self.bytes_allocated, entities)
    }

    /// Allocations per entity. Archetype rows amortise to well below one.
    pub fn allocations_per_entity(&self, entities: usize) -> f64 {
        per(self.allocation_count, entities)
    }
}

fn per(total: u64, entities: usize) -> f64 {
    if entities == 0 {
        0.0
    } else {
        total as f64 / entities as f64
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocated: {} bytes ({} allocs), peak: {} bytes",
            self.bytes_allocated, self.allocation_count, self.peak_bytes
        )
    }
}

/// Run `f` and report the heap activity it caused.
///
/// Without the `memory_profiling` feature this only runs `f` and reports zeroes. Only one dhat
/// profiler may be alive at a time.
pub fn measure_memory<R>(f: impl FnOnce() -> R) -> (R, MemoryStats) {
    #[cfg(feature = "memory_profiling")]
    {
        let _profiler = dhat::Profiler::new_heap();
        let result = f();
        let stats = dhat::HeapStats::get();
        (
            result,
            MemoryStats {
                bytes_allocated: stats.total_bytes,
                allocation_count: stats.total_blocks,
                peak_bytes: stats.max_bytes as u64,
            },
        )
    }
    #[cfg(not(feature = "memory_profiling"))]
    {
        (f(), MemoryStats::default())
    }
}
