/// Tunable widths for the coincidence cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Coincidence window W, in seconds. Default 10s.
    pub window_seconds: f64,
    /// Age past which a sub-group's anchor causes eviction, in seconds.
    /// Default 24h.
    pub expiration_seconds: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { window_seconds: 10.0, expiration_seconds: 24 * 3600 }
    }
}
