// src/flows/global.rs
use crate::analysis::metrics::MetricsCalculator;
use crate::analysis::policy::{baseline_or_fallback, safe_divide_or_zero};
use crate::domain::catalog::{RegionDescriptor, REGIONS};
use crate::domain::models::{
    AssetClass, BilateralFlowEdge, FlowRecord, Provenance, RegionData, RegionMetricSnapshot,
    RegionalPoint,
};
use chrono::Duration;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Length of the comparison window preceding the latest date
pub const PRIOR_WINDOW_DAYS: i64 = 7;

/// Share of ordered region pairs that get a synthesized edge
const SYNTHETIC_EDGE_PROBABILITY: f64 = 0.3;
const SYNTHETIC_AMOUNT_RANGE: (f64, f64) = (1e9, 5e10);
const SYNTHETIC_NET_FLOW_RANGE: (f64, f64) = (-5.0, 5.0);
const SYNTHETIC_ASSET_CLASSES: [AssetClass; 3] =
    [AssetClass::Equities, AssetClass::Bonds, AssetClass::Currency];

/// Edge list of the global flow payload together with how it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct FlowGraph {
    pub edges: Vec<BilateralFlowEdge>,
    pub provenance: Provenance,
}

/// Turns the regional and flow tables into the global flow payload
#[derive(Debug, Clone, Default)]
pub struct FlowAggregator {
    metrics: MetricsCalculator,
}

impl FlowAggregator {
    pub fn new(metrics: MetricsCalculator) -> Self {
        Self { metrics }
    }

    /// One entry per configured region, in registry order
    pub fn build_regions(
        &self,
        regional: &[RegionalPoint],
        latest: &BTreeMap<String, RegionMetricSnapshot>,
    ) -> Vec<RegionData> {
        REGIONS
            .iter()
            .map(|region| {
                let metrics = latest
                    .get(region.id)
                    .copied()
                    .unwrap_or_else(|| fallback_snapshot(region));

                RegionData {
                    id: region.id.to_string(),
                    name: region.name.to_string(),
                    stock_index: metrics.stock_index,
                    stock_change: stock_change(regional, region.id),
                    currency: region.currency.to_string(),
                    currency_strength: metrics.currency_strength,
                    bond_yield: metrics.bond_yield,
                }
            })
            .collect()
    }

    /// Sum the latest day's flows per (source, target, asset class) and compare
    /// each against the preceding seven days.
    pub fn aggregate_edges(&self, flows: &[FlowRecord]) -> Vec<BilateralFlowEdge> {
        let Some(latest_date) = flows.iter().map(|f| f.date).max() else {
            return Vec::new();
        };
        let window_start = latest_date - Duration::days(PRIOR_WINDOW_DAYS);

        let mut current: BTreeMap<(&str, &str, AssetClass), f64> = BTreeMap::new();
        let mut prior: BTreeMap<(&str, &str, AssetClass), f64> = BTreeMap::new();
        for flow in flows {
            let key = (flow.source.as_str(), flow.target.as_str(), flow.asset_class);
            if flow.date == latest_date {
                *current.entry(key).or_insert(0.0) += flow.amount;
            } else if flow.date >= window_start && flow.date < latest_date {
                *prior.entry(key).or_insert(0.0) += flow.amount;
            }
        }

        current
            .into_iter()
            .map(|((source, target, asset_class), amount)| {
                let prior_sum = prior.get(&(source, target, asset_class)).copied().unwrap_or(0.0);
                let baseline = baseline_or_fallback(prior_sum, amount);
                log::debug!(
                    "Edge {}->{} ({}): amount={}, baseline={}",
                    source,
                    target,
                    asset_class,
                    amount,
                    baseline
                );

                BilateralFlowEdge {
                    source: source.to_string(),
                    target: target.to_string(),
                    asset_class,
                    amount,
                    net_flow_percent: self.metrics.calculate_net_flow_percentage(amount, baseline),
                }
            })
            .collect()
    }

    /// Placeholder edges for roughly 30% of ordered region pairs
    pub fn synthesize_edges<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<BilateralFlowEdge> {
        let mut edges = Vec::new();
        for source in REGIONS.iter() {
            for target in REGIONS.iter().filter(|t| t.id != source.id) {
                if rng.gen::<f64>() >= SYNTHETIC_EDGE_PROBABILITY {
                    continue;
                }
                let asset_class = SYNTHETIC_ASSET_CLASSES
                    .choose(rng)
                    .copied()
                    .unwrap_or(AssetClass::Equities);
                edges.push(BilateralFlowEdge {
                    source: source.id.to_string(),
                    target: target.id.to_string(),
                    asset_class,
                    amount: rng.gen_range(SYNTHETIC_AMOUNT_RANGE.0..SYNTHETIC_AMOUNT_RANGE.1),
                    net_flow_percent: rng.gen_range(SYNTHETIC_NET_FLOW_RANGE.0..SYNTHETIC_NET_FLOW_RANGE.1),
                });
            }
        }
        edges
    }

    /// Aggregated edges, or synthesized ones marked as such when nothing aggregates
    pub fn build_flow_graph<R: Rng + ?Sized>(&self, flows: &[FlowRecord], rng: &mut R) -> FlowGraph {
        let edges = self.aggregate_edges(flows);
        if !edges.is_empty() {
            return FlowGraph {
                edges,
                provenance: Provenance::Derived,
            };
        }

        log::warn!("No flows found, generating synthetic flows");
        FlowGraph {
            edges: self.synthesize_edges(rng),
            provenance: Provenance::Synthetic,
        }
    }
}

/// Snapshot used for a region absent from the latest date
pub fn fallback_snapshot(region: &RegionDescriptor) -> RegionMetricSnapshot {
    RegionMetricSnapshot {
        stock_index: region.base_index,
        currency_strength: region.fallback_currency_strength(),
        bond_yield: region.base_yield,
    }
}

/// Percent change of the region's last index value against the one before it
pub fn stock_change(regional: &[RegionalPoint], region_id: &str) -> f64 {
    let mut history: Vec<&RegionalPoint> =
        regional.iter().filter(|p| p.region_id == region_id).collect();
    if history.len() < 2 {
        return 0.0;
    }
    history.sort_by_key(|p| p.date);

    let latest = history[history.len() - 1].stock_index;
    let previous = history[history.len() - 2].stock_index;
    safe_divide_or_zero(latest - previous, previous) * 100.0
}
