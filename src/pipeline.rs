//! Cached transform pipeline.
//!
//! [`Pipeline::serve`] is the single entry point a request handler needs:
//!
//! ```text
//! load_source() → identify (header only) → resolve + plan
//!        │
//! key = compute_cache_key(identity, params)
//! store.get(key) ── hit ──────────────────────────────▶ bytes
//!        │
//!       miss
//!        ▼
//! decode → orient → crop → resize → pad → encode → store.put(key) → bytes
//! ```
//!
//! The key covers the resolved render parameters, so the source header has to
//! be read before the probe: `400x0` and `400x300` on an 800x600 source are
//! one entry. A hit never decodes pixels. The store is written only once a
//! complete result exists, so an abandoned or failed render never leaves a
//! partial entry behind.
//!
//! Cache I/O failures degrade to uncached behaviour: a failed `get` is
//! treated as a miss and a failed `put` still returns the rendered bytes.
//! Both are logged at `warn`.

use crate::cache::{CacheKey, CacheStats, CacheStore, SourceIdentity, compute_cache_key};
use crate::imaging::{
    BackendError, ImageBackend, OutputFormat, TransformLimits, TransformRequest, operations,
};
use std::io;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Imaging error: {0}")]
    Imaging(#[from] BackendError),
    #[error("Failed to read source: {0}")]
    Source(io::Error),
}

/// A served image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// True when the bytes came from the store without rendering.
    pub cached: bool,
}

/// Backend + caller-owned store + shared hit/miss counters.
///
/// `Pipeline` is `Sync` whenever its backend and store are, so one instance
/// can serve many threads.
pub struct Pipeline<B, S> {
    backend: B,
    store: S,
    limits: TransformLimits,
    stats: CacheStats,
}

impl<B: ImageBackend, S: CacheStore> Pipeline<B, S> {
    pub fn new(backend: B, store: S) -> Self {
        Self {
            backend,
            store,
            limits: TransformLimits::default(),
            stats: CacheStats::default(),
        }
    }

    /// Replace the default size limits.
    pub fn with_limits(mut self, limits: TransformLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limits(&self) -> &TransformLimits {
        &self.limits
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Cache key `request` would be stored under, computed from the source
    /// header without decoding pixels.
    pub fn cache_key(
        &self,
        identity: &SourceIdentity,
        source: &[u8],
        request: &TransformRequest,
    ) -> Result<CacheKey, PipelineError> {
        let params = operations::prepare_transform(&self.backend, source, request, &self.limits)?;
        Ok(compute_cache_key(identity, &params))
    }

    /// Serve `request` for the source identified by `identity`.
    ///
    /// `load_source` is called exactly once. Its bytes are only decoded on a
    /// cache miss.
    pub fn serve<F>(
        &self,
        identity: &SourceIdentity,
        request: &TransformRequest,
        load_source: F,
    ) -> Result<Rendered, PipelineError>
    where
        F: FnOnce() -> io::Result<Vec<u8>>,
    {
        let source = load_source().map_err(PipelineError::Source)?;
        let params = operations::prepare_transform(&self.backend, &source, request, &self.limits)?;
        let key = compute_cache_key(identity, &params);

        if let Some(bytes) = self.probe(&key) {
            debug!(key = %key, source = %identity.path.display(), "cache hit");
            self.stats.hit();
            return Ok(Rendered {
                bytes,
                format: params.format,
                cached: true,
            });
        }

        debug!(key = %key, source = %identity.path.display(), "cache miss");
        self.stats.miss();

        let bytes = self.backend.transform(&params)?;

        if let Err(e) = self.store.put(&key, &bytes) {
            warn!(key = %key, error = %e, "cache write failed; serving uncached result");
        }

        Ok(Rendered {
            bytes,
            format: params.format,
            cached: false,
        })
    }

    fn probe(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match self.store.get(key) {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }
}
