//! Property-based tests for fplbench
//!
//! Generator invariants over random sizes and seeds, and the bookkeeping of
//! task enumeration and core pinning.

mod experiment_properties;
mod formula_properties;
