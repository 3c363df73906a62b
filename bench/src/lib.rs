//! Benchmark utilities for the archetype storage.
//!
//! - **Microbenchmarks**: entity creation, iteration, migration and persistence
//! - **Memory tracking**: heap allocation profiling via dhat
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p rusty_ecs_bench
//!
//! # Run a specific group
//! cargo bench -p rusty_ecs_bench -- foreach
//!
//! # Run with memory profiling (slower)
//! cargo bench -p rusty_ecs_bench --features memory_profiling
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports. Memory profiles are written to
//! `dhat-heap.json` for DHAT's viewer.

pub mod components;
pub mod memory;
