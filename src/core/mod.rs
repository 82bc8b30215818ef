//! Rate caching policy and its abstractions

pub mod config;
pub mod log;
pub mod provider;
pub mod rate;
pub mod source;

// Re-export main types for cleaner imports
pub use provider::{RateProvider, RateProviderOptions};
pub use rate::{CachedRate, DEFAULT_RATE, RateError, RateOutcome};
pub use source::{Clock, RateSource, SystemClock};
