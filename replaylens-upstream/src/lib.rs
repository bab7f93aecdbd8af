//! replaylens upstream - clients for external services
//!
//! - [`ParserClient`]: replay parser, one [`CircuitBreaker`] per operation
//! - [`DeadlockApiClient`]: match metadata and replay download URLs

pub mod circuit_breaker;
pub mod metadata;
pub mod parser;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, Permit};
pub use metadata::{DeadlockApiClient, MetadataConfig, MetadataProvider};
pub use parser::{
    LocalDemo, ParserClient, ParserConfig, ReplayParser, SourceReference, CHECK_DEMO_OPERATION,
    PARSE_OPERATION,
};
