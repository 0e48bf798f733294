//! Purpose: Library crate behind the `flatbatch` CLI and its tests.
//! Exports: `core` (paged buffers, row encoder, accessors, typed stores, errors), `json`.
//! Role: In-memory batch building blocks; callers own threading and persistence.
//! Invariants: Construction is single-producer; finished structures are read-only and shareable.
//! Invariants: Core modules take explicit options instead of process-wide settings.
pub mod core;
pub mod json;
