//! Constants for the replaylens API

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PORT: u16 = 8080;

// ============================================================================
// HTTP CACHING
// ============================================================================

/// Default `Cache-Control: max-age` for analysis responses (5 minutes)
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 300;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str =
    "replaylens_api=debug,replaylens_upstream=info,tower_http=debug,info";
