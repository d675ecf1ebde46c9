//! Per-token prices for the models we know about.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// (input, output) USD per token for a model name.
///
/// Matches on model family prefixes so dated snapshots resolve to the
/// family price. Unknown models are free as far as logging is concerned.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    let model = model.to_lowercase();
    if model.contains("opus") {
        (dec!(0.000015), dec!(0.000075))
    } else if model.contains("sonnet") {
        (dec!(0.000003), dec!(0.000015))
    } else if model.contains("haiku") {
        (dec!(0.0000008), dec!(0.000004))
    } else if model.starts_with("gpt-4o-mini") {
        (dec!(0.00000015), dec!(0.0000006))
    } else if model.starts_with("gpt-4o") {
        (dec!(0.0000025), dec!(0.00001))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_snapshots_resolve_to_family() {
        assert_eq!(
            model_cost("claude-sonnet-4-20250514"),
            (dec!(0.000003), dec!(0.000015))
        );
    }

    #[test]
    fn mini_is_not_priced_as_full_model() {
        assert_ne!(model_cost("gpt-4o-mini"), model_cost("gpt-4o"));
    }

    #[test]
    fn unknown_model_is_zero() {
        assert_eq!(model_cost("local-llama"), (Decimal::ZERO, Decimal::ZERO));
    }
}
