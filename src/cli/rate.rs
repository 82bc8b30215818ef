use super::ui::{self, StyleType};
use crate::core::{RateOutcome, RateProvider};

/// Renders a resolved rate for the terminal.
pub fn display_rate(currency: &str, source: &str, outcome: &RateOutcome) -> String {
    let tier_style = match outcome {
        RateOutcome::Fresh(_) => StyleType::Value,
        RateOutcome::Stale(_) => StyleType::Warning,
        RateOutcome::Default(_) => StyleType::Error,
    };
    let updated = outcome
        .fetched_at()
        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());

    format!(
        "{}\n{} {}\n{} {}",
        ui::style_text(&format!("{currency} rate ({source})"), StyleType::Title),
        ui::style_text(&format!("{:.4}", outcome.value()), StyleType::Value),
        ui::style_text(&format!("[{}]", outcome.tier()), tier_style),
        ui::style_text("Last updated:", StyleType::Subtle),
        updated,
    )
}

pub async fn show_rate(provider: &RateProvider, currency: &str) {
    let spinner = ui::new_spinner(&format!("Fetching rate from {}", provider.source_name()));
    let outcome = provider.resolve().await;
    spinner.finish_and_clear();

    println!("{}", display_rate(currency, provider.source_name(), &outcome));
}
