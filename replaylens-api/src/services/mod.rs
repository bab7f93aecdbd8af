//! Service Layer
//!
//! Business logic behind the HTTP handlers. Handlers parse and render;
//! services own the fetch, transform and persist pipeline.

mod analysis;
mod single_flight;

pub use analysis::*;
pub use single_flight::SingleFlight;
