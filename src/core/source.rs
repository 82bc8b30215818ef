//! Seams between the caching policy and the outside world

use super::rate::{RateError, parse_rate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// An upstream that publishes the rate as text.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Short label for the upstream, e.g. `"BCV"`.
    fn name(&self) -> &str;

    /// Fetches the raw rate text exactly as the upstream renders it.
    async fn fetch_raw_rate_text(&self) -> Result<String, RateError>;

    fn parse_rate(&self, raw: &str) -> Result<f64, RateError> {
        parse_rate(raw)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
