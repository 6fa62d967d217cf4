// src/analysis/metrics.rs
use crate::analysis::policy::{finite_or_zero, safe_divide_or_zero};
use crate::analysis::statistics::{pct_returns, sample_std, CorrelationMethod};
use crate::domain::models::{FlowRecord, Provenance, TimeSeriesPoint};
use chrono::NaiveDate;
use rand::Rng;
use rand_distr::StandardNormal;
use std::collections::{BTreeMap, BTreeSet};

/// Trading days used to annualize daily volatility
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default trailing window for rolling correlation and volatility
pub const DEFAULT_WINDOW: usize = 30;

/// Volatility treated as "normal" when weighting flow scores
pub const BASE_VOLATILITY: f64 = 0.15;

/// Standard deviation of the placeholder intensity drawn without a previous snapshot
const PLACEHOLDER_INTENSITY_STD: f64 = 0.02;

/// Square correlation matrix keyed by entity id (ids sorted ascending)
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub ids: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|candidate| candidate == id)
    }

    /// Correlation between two entities; NaN values are returned as-is
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.values[i][j])
    }

    /// Upper-triangle pairs in row-major order, skipping undefined correlations
    pub fn upper_triangle(&self) -> Vec<(&str, &str, f64)> {
        let mut pairs = Vec::new();
        for i in 0..self.ids.len() {
            for j in (i + 1)..self.ids.len() {
                let value = self.values[i][j];
                if !value.is_nan() {
                    pairs.push((self.ids[i].as_str(), self.ids[j].as_str(), value));
                }
            }
        }
        pairs
    }
}

/// Per-asset flow intensity plus whether it was measured or drawn at random
#[derive(Debug, Clone, PartialEq)]
pub struct FlowIntensity {
    pub values: BTreeMap<String, f64>,
    pub provenance: Provenance,
}

/// Metrics calculator for correlations, volatility and flow scoring
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    window_size: usize,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl MetricsCalculator {
    pub fn new(window_size: usize) -> Self {
        log::info!("MetricsCalculator initialized with window_size={}", window_size);
        Self { window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Correlation matrix of simple returns across every entity in the series.
    ///
    /// Duplicate (date, entity) rows keep the last occurrence. Dates on which any
    /// entity lacks a return are dropped. Undefined correlations stay NaN.
    pub fn calculate_correlation_matrix(
        &self,
        series: &[TimeSeriesPoint],
        method: CorrelationMethod,
    ) -> CorrelationMatrix {
        log::info!("Calculating {} correlation matrix", method.as_str());

        let wide = pivot_last_wins(series);
        let ids: Vec<String> = wide
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return CorrelationMatrix::empty();
        }

        // Returns per date, keeping only dates where every entity has one
        let dates: Vec<&NaiveDate> = wide.keys().collect();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); ids.len()];
        for pair in dates.windows(2) {
            let (prev_row, row) = (&wide[pair[0]], &wide[pair[1]]);
            let returns: Option<Vec<f64>> = ids
                .iter()
                .map(|id| {
                    let prev = prev_row.get(id)?;
                    let curr = row.get(id)?;
                    let r = curr / prev - 1.0;
                    r.is_finite().then_some(r)
                })
                .collect();
            if let Some(returns) = returns {
                for (column, r) in columns.iter_mut().zip(returns) {
                    column.push(r);
                }
            }
        }

        let n = ids.len();
        let mut values = vec![vec![f64::NAN; n]; n];
        for i in 0..n {
            for j in i..n {
                let corr = if i == j {
                    // Self-correlation is only defined for a series that moves
                    let std = sample_std(&columns[i]);
                    if std.is_finite() && std > 0.0 {
                        1.0
                    } else {
                        f64::NAN
                    }
                } else {
                    method.correlate(&columns[i], &columns[j])
                };
                values[i][j] = corr;
                values[j][i] = corr;
            }
        }

        log::info!("Correlation matrix calculated: {}x{}", n, n);
        CorrelationMatrix { ids, values }
    }

    /// Correlation of returns over the trailing window of dates both entities share
    pub fn calculate_rolling_correlation(
        &self,
        series: &[TimeSeriesPoint],
        id_a: &str,
        id_b: &str,
        window: Option<usize>,
    ) -> f64 {
        let window = window.unwrap_or(self.window_size);
        log::debug!("Calculating rolling correlation between {} and {}", id_a, id_b);

        let a = entity_prices(series, id_a);
        let b = entity_prices(series, id_b);

        // Inner join on date
        let (aligned_a, aligned_b): (Vec<f64>, Vec<f64>) = a
            .iter()
            .filter_map(|(date, pa)| b.get(date).map(|pb| (*pa, *pb)))
            .unzip();

        let returns_a = pct_returns(&aligned_a);
        let returns_b = pct_returns(&aligned_b);
        if returns_a.len() < 2 {
            return 0.0;
        }

        let take = window.min(returns_a.len());
        let start = returns_a.len() - take;
        let corr = CorrelationMethod::Pearson.correlate(&returns_a[start..], &returns_b[start..]);
        if corr.is_nan() {
            0.0
        } else {
            corr
        }
    }

    /// Annualized standard deviation of returns over the trailing window
    pub fn calculate_volatility(
        &self,
        series: &[TimeSeriesPoint],
        entity_id: &str,
        window: Option<usize>,
    ) -> f64 {
        let window = window.unwrap_or(self.window_size);
        log::debug!("Calculating volatility for {}", entity_id);

        let prices: Vec<f64> = entity_prices(series, entity_id).into_values().collect();
        if prices.len() < 2 {
            return 0.0;
        }

        let returns = pct_returns(&prices);
        let start = returns.len().saturating_sub(window);
        let volatility = sample_std(&returns[start..]) * TRADING_DAYS_PER_YEAR.sqrt();
        finite_or_zero(volatility)
    }

    /// Change in each asset's share of the total, in percent of its previous share.
    ///
    /// Without a previous snapshot there is nothing to measure: each asset gets an
    /// independent N(0, 0.02) draw and the result is marked synthetic. That path is
    /// non-deterministic by construction.
    pub fn calculate_flow_intensity(
        &self,
        current_caps: &BTreeMap<String, f64>,
        previous_caps: Option<&BTreeMap<String, f64>>,
    ) -> FlowIntensity {
        self.calculate_flow_intensity_with_rng(current_caps, previous_caps, &mut rand::thread_rng())
    }

    pub fn calculate_flow_intensity_with_rng<R: Rng + ?Sized>(
        &self,
        current_caps: &BTreeMap<String, f64>,
        previous_caps: Option<&BTreeMap<String, f64>>,
        rng: &mut R,
    ) -> FlowIntensity {
        log::info!("Calculating flow intensity");

        let Some(previous_caps) = previous_caps else {
            log::warn!("No previous market caps, drawing placeholder flow intensity");
            let values = current_caps
                .keys()
                .map(|asset| {
                    let z: f64 = rng.sample(StandardNormal);
                    (asset.clone(), z * PLACEHOLDER_INTENSITY_STD)
                })
                .collect();
            return FlowIntensity {
                values,
                provenance: Provenance::Synthetic,
            };
        };

        let total_current: f64 = current_caps.values().sum();
        let total_previous: f64 = previous_caps.values().sum();

        let values = current_caps
            .iter()
            .map(|(asset, cap)| {
                let intensity = match previous_caps.get(asset) {
                    Some(&prev) if prev > 0.0 => {
                        let prev_share = safe_divide_or_zero(prev, total_previous);
                        let curr_share = safe_divide_or_zero(*cap, total_current);
                        safe_divide_or_zero(curr_share - prev_share, prev_share) * 100.0
                    }
                    _ => 0.0,
                };
                (asset.clone(), intensity)
            })
            .collect();

        FlowIntensity {
            values,
            provenance: Provenance::Derived,
        }
    }

    /// Flow score in [0, 1] that grows with correlation strength, flow and volatility
    pub fn calculate_volatility_weighted_flow_score(
        &self,
        correlation: f64,
        flow_intensity: f64,
        volatility: f64,
        base_volatility: Option<f64>,
    ) -> f64 {
        let base_volatility = base_volatility.unwrap_or(BASE_VOLATILITY);
        // Capped at twice the base; f64::min discards a NaN operand
        let vol_ratio = (volatility / base_volatility).min(2.0);
        let score = correlation.abs() * flow_intensity.abs() / 100.0 * vol_ratio;
        // max/min rather than clamp so NaN resolves to 0.0
        score.max(0.0).min(1.0)
    }

    /// Relative change of a flow versus its baseline, 0.0 when the baseline is zero
    pub fn calculate_net_flow_percentage(&self, current_amount: f64, previous_amount: f64) -> f64 {
        safe_divide_or_zero(current_amount - previous_amount, previous_amount) * 100.0
    }

    /// (outflow source->target, inflow target->source) on the table's latest date
    pub fn calculate_bilateral_flows(
        &self,
        flows: &[FlowRecord],
        source: &str,
        target: &str,
    ) -> (f64, f64) {
        log::debug!("Calculating bilateral flows: {} <-> {}", source, target);

        let Some(latest) = flows.iter().map(|f| f.date).max() else {
            return (0.0, 0.0);
        };

        flows
            .iter()
            .filter(|f| f.date == latest)
            .fold((0.0, 0.0), |(outflow, inflow), f| {
                if f.source == source && f.target == target {
                    (outflow + f.amount, inflow)
                } else if f.source == target && f.target == source {
                    (outflow, inflow + f.amount)
                } else {
                    (outflow, inflow)
                }
            })
    }
}

/// date -> entity -> value, later rows overwriting earlier duplicates
fn pivot_last_wins(series: &[TimeSeriesPoint]) -> BTreeMap<NaiveDate, BTreeMap<String, f64>> {
    let mut wide: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    for point in series {
        wide.entry(point.date)
            .or_default()
            .insert(point.entity_id.clone(), point.value);
    }
    wide
}

/// Date-ordered values for one entity, duplicates resolved last-wins
fn entity_prices(series: &[TimeSeriesPoint], entity_id: &str) -> BTreeMap<NaiveDate, f64> {
    series
        .iter()
        .filter(|p| p.entity_id == entity_id)
        .map(|p| (p.date, p.value))
        .collect()
}
