//! Properties the derived metrics must hold for any input.

use chrono::NaiveDate;
use money_flow::analysis::{generate_insights, CorrelationMatrix, CorrelationMethod, MetricsCalculator};
use money_flow::domain::catalog::PIPELINE_ASSETS;
use money_flow::domain::models::{price_series, AssetClass, FlowRecord, RegionalPoint, TimeSeriesPoint};
use money_flow::flows::global::stock_change;
use money_flow::flows::{FlowAggregator, GraphSynthesizer};
use money_flow::market_data::pipeline::{date_range, simulate_asset_prices};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

fn simulated_series(seed: u64, days: usize) -> Vec<TimeSeriesPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dates = date_range(day(31), days);
    let prices: Vec<_> = PIPELINE_ASSETS
        .iter()
        .flat_map(|asset| simulate_asset_prices(&mut rng, asset, &dates))
        .collect();
    price_series(&prices)
}

fn flow(date: NaiveDate, source: &str, target: &str, amount: f64) -> FlowRecord {
    FlowRecord {
        date,
        source: source.to_string(),
        target: target.to_string(),
        asset_class: AssetClass::Equities,
        amount,
    }
}

// =============================================================================
// Metrics Engine
// =============================================================================

#[test]
fn net_flow_against_a_zero_baseline_is_zero() {
    let metrics = MetricsCalculator::default();
    for current in [0.0, 1.0, -250.0, 1e12] {
        assert_eq!(metrics.calculate_net_flow_percentage(current, 0.0), 0.0);
    }
}

#[test]
fn rolling_correlation_is_symmetric() {
    let metrics = MetricsCalculator::default();
    let series = simulated_series(11, 60);

    for window in [None, Some(5), Some(500)] {
        let ab = metrics.calculate_rolling_correlation(&series, "stocks", "crypto", window);
        let ba = metrics.calculate_rolling_correlation(&series, "crypto", "stocks", window);
        assert!((ab - ba).abs() < 1e-12, "{} vs {}", ab, ba);
        assert!((-1.0..=1.0).contains(&ab));
    }
}

#[test]
fn constant_prices_have_zero_volatility() {
    let metrics = MetricsCalculator::default();
    let series: Vec<_> = (1..=20)
        .map(|d| TimeSeriesPoint::new(day(d), "cash", 100.0))
        .collect();

    let volatility = metrics.calculate_volatility(&series, "cash", None);
    assert_eq!(volatility, 0.0);
}

#[test]
fn correlation_matrix_diagonal_is_one() {
    let metrics = MetricsCalculator::default();
    let series = simulated_series(3, 40);

    for method in [CorrelationMethod::Pearson, CorrelationMethod::Spearman, CorrelationMethod::Kendall] {
        let matrix = metrics.calculate_correlation_matrix(&series, method);
        assert_eq!(matrix.len(), PIPELINE_ASSETS.len());
        for id in &matrix.ids {
            assert_eq!(matrix.get(id, id), Some(1.0), "{} diagonal under {:?}", id, method);
        }
    }
}

#[test]
fn flow_score_is_clamped_for_extreme_inputs() {
    let metrics = MetricsCalculator::default();
    for correlation in [-1.0, 0.0, 1.0] {
        for intensity in [-10_000.0, -1.0, 0.0, 1.0, 10_000.0] {
            for volatility in [0.0, 0.15, 1.5, f64::NAN] {
                let score = metrics.calculate_volatility_weighted_flow_score(correlation, intensity, volatility, None);
                assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            }
        }
    }
}

#[test]
fn insights_on_empty_inputs_are_empty() {
    let insights = generate_insights(&CorrelationMatrix::empty(), &BTreeMap::new(), &BTreeMap::new());
    assert!(insights.is_empty());
}

// =============================================================================
// Flow Aggregator
// =============================================================================

#[test]
fn same_day_records_are_summed_into_one_edge() {
    let aggregator = FlowAggregator::default();
    let flows = vec![flow(day(10), "usa", "china", 100.0), flow(day(10), "usa", "china", 50.0)];

    let edges = aggregator.aggregate_edges(&flows);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].amount, 150.0);
}

#[test]
fn empty_prior_window_uses_ninety_percent_baseline() {
    let aggregator = FlowAggregator::default();
    let flows = vec![
        flow(day(10), "usa", "japan", 100.0),
        // Outside the seven-day window
        flow(day(2), "usa", "japan", 400.0),
    ];

    let edges = aggregator.aggregate_edges(&flows);
    let pct = edges[0].net_flow_percent;
    assert!((pct - (100.0 - 90.0) / 90.0 * 100.0).abs() < 1e-9);
    assert!((pct - 11.11).abs() < 0.01);
}

#[test]
fn single_point_region_has_zero_stock_change() {
    let regional = vec![RegionalPoint {
        date: day(10),
        region_id: "india".to_string(),
        stock_index: 72_458.79,
        currency_strength: 0.8,
        bond_yield: 7.18,
    }];
    assert_eq!(stock_change(&regional, "india"), 0.0);
}

// =============================================================================
// Graph Synthesizer
// =============================================================================

#[test]
fn industry_graph_is_the_complete_graph_on_five_nodes() {
    let synthesizer = GraphSynthesizer::new();
    for seed in 0..20 {
        let data = synthesizer.generate(&mut StdRng::seed_from_u64(seed));
        assert_eq!(data.nodes.len(), 5);
        assert_eq!(data.edges.len(), 10);

        let mut pairs = BTreeSet::new();
        for edge in &data.edges {
            assert_ne!(edge.source, edge.target);
            let pair = if edge.source < edge.target {
                (edge.source.clone(), edge.target.clone())
            } else {
                (edge.target.clone(), edge.source.clone())
            };
            assert!(pairs.insert(pair), "duplicate pair {}-{}", edge.source, edge.target);
        }

        for node in &data.nodes {
            let expected = ((1.0 + node.net_flow_pct / 100.0) * 10_000.0).round() / 10_000.0;
            assert!((node.size - expected).abs() < 1e-9);
        }
    }
}
