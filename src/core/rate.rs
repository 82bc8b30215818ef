//! Rate data model, upstream error taxonomy and text parsing

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Last resort rate, served only when nothing was ever fetched.
pub const DEFAULT_RATE: f64 = 361.49;

/// A rate obtained from the upstream, with the time it was fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRate {
    pub value: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Reasons a refresh can fail. Both are recovered inside the provider.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Unparsable rate: {0}")]
    UnparsableRate(String),
}

/// Which fallback tier produced a rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateOutcome {
    Fresh(CachedRate),
    Stale(CachedRate),
    Default(f64),
}

impl RateOutcome {
    pub fn value(&self) -> f64 {
        match self {
            RateOutcome::Fresh(rate) | RateOutcome::Stale(rate) => rate.value,
            RateOutcome::Default(value) => *value,
        }
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RateOutcome::Fresh(rate) | RateOutcome::Stale(rate) => Some(rate.fetched_at),
            RateOutcome::Default(_) => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, RateOutcome::Fresh(_))
    }

    pub fn tier(&self) -> &'static str {
        match self {
            RateOutcome::Fresh(_) => "fresh",
            RateOutcome::Stale(_) => "stale",
            RateOutcome::Default(_) => "default",
        }
    }
}

/// Converts localized text like `"1.234,56 Bs"` into `"1234.56"`.
///
/// When a comma is present it is the decimal separator and every dot is a
/// thousands separator. Without a comma a lone dot is the decimal point, and
/// several dots are thousands separators only if each group after the first
/// has exactly three digits; any other dot layout is ambiguous and yields
/// `None`. Characters other than digits and separators are dropped.
pub fn normalize_rate_text(raw: &str) -> Option<String> {
    let text = raw.trim();

    if text.contains(',') {
        let mut normalized = String::with_capacity(text.len());
        let mut seen_point = false;
        for c in text.chars() {
            match c {
                '0'..='9' => normalized.push(c),
                ',' if !seen_point => {
                    normalized.push('.');
                    seen_point = true;
                }
                _ => {}
            }
        }
        return Some(normalized);
    }

    let kept: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let groups: Vec<&str> = kept.split('.').filter(|g| !g.is_empty()).collect();

    match groups.as_slice() {
        [] => Some(String::new()),
        [whole] => Some(whole.to_string()),
        [whole, fraction] => Some(format!("{whole}.{fraction}")),
        [_, rest @ ..] if rest.iter().all(|g| g.len() == 3) => Some(groups.concat()),
        _ => None,
    }
}

pub fn parse_rate(raw: &str) -> Result<f64, RateError> {
    let normalized = normalize_rate_text(raw).ok_or_else(|| {
        RateError::UnparsableRate(format!("'{raw}' has ambiguous separators"))
    })?;
    let value: f64 = normalized
        .parse()
        .map_err(|_| RateError::UnparsableRate(format!("'{raw}' is not a number")))?;
    ensure_positive(value, raw)
}

/// Rejects values no cache entry may hold.
pub fn ensure_positive(value: f64, raw: &str) -> Result<f64, RateError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RateError::UnparsableRate(format!(
            "'{raw}' is not a positive rate"
        )));
    }
    Ok(value)
}
