//! # Simple Thumbs
//!
//! On-demand image transforms with a result cache. Give it a source image and
//! a request (size, mode, format, quality, autorotate) and it returns encoded
//! bytes, rendering them only when the same source version has not already
//! been served with the same request.
//!
//! # Architecture: Cached Pipeline
//!
//! ```text
//! read source → identify header → plan → key → probe ─ hit ──────────▶ bytes
//!                                                      │
//!                                                     miss
//!                                                      ▼
//!           decode → orient → crop → resize → pad → encode → put → bytes
//! ```
//!
//! Every stage after planning is a pure function of the source bytes and the
//! request, so the output for a given cache key is byte-identical no matter
//! which caller renders it. That is what makes a plain key → bytes store
//! sufficient: concurrent misses for one key may both render, and whichever
//! `put` lands last stores the same bytes.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Request types, dimension math, EXIF orientation, the `ImageBackend` seam and its `image`-crate implementation |
//! | [`cache`] | Cache key derivation and the memory, disk and tiered stores |
//! | [`pipeline`] | Plan → key → probe → render → put, with hit/miss accounting |
//! | [`config`] | `config.toml` loading, validation and merging over stock defaults |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Key After Planning
//!
//! A cache key is derived from the source's path and modification time plus
//! the fully planned render: target size, crop window, canvas, format,
//! effective quality and whether a rotation is applied. Planning only needs
//! the source header, so a hit reads the file but never decodes pixels.
//! Requests that render the same bytes share one entry: `0x300` and
//! `400x300` on an 800x600 source, or two PNG requests that differ only in
//! quality.
//!
//! ## Caller-Owned Cache
//!
//! There is no global cache. The application constructs a store, hands it to a
//! [`pipeline::Pipeline`], and decides its lifetime and eviction policy. Tests
//! use an unbounded [`cache::MemoryStore`]; the CLI uses a
//! [`cache::TieredStore`] over a directory.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling (Lanczos3) and encoding use the `image` crate with
//! no system libraries. EXIF orientation comes from the decoders'
//! header metadata, so identify never has to decode pixels.
//!
//! ## Ownership Instead of Cleanup
//!
//! Each pixel stage takes its buffer by value and returns a new one. An
//! early return drops whatever buffer is live at that point, so no stage
//! needs explicit release logic.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod output;
pub mod pipeline;
