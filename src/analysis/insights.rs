// src/analysis/insights.rs
use crate::analysis::metrics::CorrelationMatrix;
use crate::analysis::policy::safe_divide_or_zero;
use std::collections::BTreeMap;

/// Flow intensity magnitude (percent) above which a flow is worth mentioning
pub const NOTABLE_FLOW_INTENSITY: f64 = 5.0;

/// Human-readable observations drawn from the computed metrics.
///
/// Produces, in order and only when the data supports it: the most and least
/// correlated pair, the asset with the most notable flow, and the largest asset
/// by market cap with its share of the total.
pub fn generate_insights(
    correlation_matrix: &CorrelationMatrix,
    flow_intensity: &BTreeMap<String, f64>,
    market_caps: &BTreeMap<String, f64>,
) -> Vec<String> {
    let mut insights = Vec::new();

    let pairs = correlation_matrix.upper_triangle();
    // Ties resolve to the first pair in row-major order
    let strongest = pairs
        .iter()
        .fold(None, |best: Option<&(&str, &str, f64)>, pair| match best {
            Some(b) if b.2 >= pair.2 => Some(b),
            _ => Some(pair),
        });
    let weakest = pairs
        .iter()
        .fold(None, |best: Option<&(&str, &str, f64)>, pair| match best {
            Some(b) if b.2 <= pair.2 => Some(b),
            _ => Some(pair),
        });

    if let Some((a, b, corr)) = strongest {
        insights.push(format!(
            "{} shows strongest positive correlation with {} ({:.2})",
            title_case(a),
            title_case(b),
            corr
        ));
    }
    if let Some((a, b, corr)) = weakest {
        insights.push(format!(
            "{} shows strongest inverse correlation with {} ({:.2})",
            title_case(a),
            title_case(b),
            corr
        ));
    }

    let largest_flow = flow_intensity
        .iter()
        .fold(None, |best: Option<(&String, f64)>, (asset, value)| match best {
            Some((_, b)) if b.abs() >= value.abs() => best,
            _ => Some((asset, *value)),
        });
    if let Some((asset, intensity)) = largest_flow {
        if intensity.abs() > NOTABLE_FLOW_INTENSITY {
            let direction = if intensity < 0.0 { "outflows" } else { "inflows" };
            insights.push(format!(
                "{} shows {} of {:.1}% vs last period",
                title_case(asset),
                direction,
                intensity.abs()
            ));
        }
    }

    let total_cap: f64 = market_caps.values().sum();
    let largest_asset = market_caps
        .iter()
        .fold(None, |best: Option<(&String, f64)>, (asset, cap)| match best {
            Some((_, b)) if b >= *cap => best,
            _ => Some((asset, *cap)),
        });
    if let Some((asset, cap)) = largest_asset {
        let share = safe_divide_or_zero(cap, total_cap) * 100.0;
        insights.push(format!(
            "{} represents {:.1}% of total market capitalization",
            title_case(asset),
            share
        ));
    }

    insights
}

/// Uppercase the first letter of each alphabetic run, lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
