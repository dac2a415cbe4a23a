//! Container configuration
//!
//! Plain validated option structs; the container persists no state and has
//! no file-format surface.

use crate::error::{DiError, Result};
use crate::scanner::PackageFilter;

/// Sizing options for the bounded resolution caches.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Upper bound on stored entries. Must be positive.
    pub max_size: usize,
    /// Initial sizing hint for the backing table. Must be positive.
    pub initial_capacity: usize,
    /// Rehash threshold hint, in `(0, 1)`.
    pub load_factor: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            initial_capacity: 16,
            load_factor: 0.75,
        }
    }
}

impl CacheConfig {
    /// Create a config with the given bound and default sizing hints.
    #[inline]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Validate every field, per the recognized-option contract.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DiError::domain("cache.max-size must be positive"));
        }
        if self.initial_capacity == 0 {
            return Err(DiError::domain("cache.initial-capacity must be positive"));
        }
        if !(self.load_factor > 0.0 && self.load_factor < 1.0) {
            return Err(DiError::domain(format!(
                "cache.load-factor must be in (0, 1), got {}",
                self.load_factor
            )));
        }
        Ok(())
    }
}

/// Top-level container options.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// Restrict the scanner's search space; empty means all reachable classes.
    pub package_filters: Vec<PackageFilter>,
    /// Per-cache bounds shared by the resolver and assignability caches.
    pub cache: CacheConfig,
    /// When true, the resolver refuses classpath fallback for unbound targets.
    pub bindings_only: bool,
    /// Worker count for the parallel executor. `None` uses the host's
    /// available parallelism.
    pub pool_size: Option<usize>,
}

impl ContainerConfig {
    /// Validate the whole option set.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        if let Some(size) = self.pool_size
            && size == 0
        {
            return Err(DiError::domain("pool-size must be positive"));
        }
        Ok(())
    }
}
