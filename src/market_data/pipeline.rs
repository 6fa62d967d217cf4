// src/market_data/pipeline.rs
use crate::domain::catalog::{AssetDescriptor, RegionDescriptor, BASE_REGION, PIPELINE_ASSETS, REGIONS, US_YIELD_SERIES};
use crate::domain::models::{AssetClass, FlowRecord, PricePoint, RegionMetricSnapshot, RegionalPoint, SeriesBar};
use crate::flows::global::fallback_snapshot;
use crate::providers::MarketDataClient;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

const START_PRICE: f64 = 100.0;
const VOLUME_NOISE_STD: f64 = 0.05;
const INDEX_DAILY_STD: f64 = 0.02;
const CURRENCY_STRENGTH_RANGE: (f64, f64) = (0.75, 1.15);
const CURRENCY_NOISE_STD: f64 = 0.01;
const YIELD_NOISE_STD: f64 = 0.05;
const FLOWS_PER_DAY: (usize, usize) = (10, 15);
/// Flow amounts are drawn in millions
const FLOW_AMOUNT_RANGE_MILLIONS: (f64, f64) = (1_000.0, 50_000.0);
const FLOW_ASSET_CLASSES: [AssetClass; 3] = [AssetClass::Equities, AssetClass::Bonds, AssetClass::Currency];
/// Volume is stored in billions as a market cap proxy
const VOLUME_TO_MARKET_CAP: f64 = 1e9;

/// Fetches and shapes the three tables.
///
/// Real provider data is used where a client is configured and answers;
/// everything else is generated from a seeded RNG so a process produces the
/// same mock tables for the same sequence of calls.
pub struct DataPipeline {
    rng: Mutex<StdRng>,
    price_client: Option<Arc<dyn MarketDataClient>>,
    rates_client: Option<Arc<dyn MarketDataClient>>,
    call_delay: Duration,
}

impl DataPipeline {
    pub fn new(seed: u64) -> Self {
        log::info!("DataPipeline initialized (seed={})", seed);
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            price_client: None,
            rates_client: None,
            call_delay: Duration::ZERO,
        }
    }

    pub fn with_price_client(mut self, client: Arc<dyn MarketDataClient>) -> Self {
        self.price_client = Some(client);
        self
    }

    pub fn with_rates_client(mut self, client: Arc<dyn MarketDataClient>) -> Self {
        self.rates_client = Some(client);
        self
    }

    /// Pause after every provider call
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub async fn fetch_asset_prices(&self, days: usize) -> Vec<PricePoint> {
        self.fetch_asset_prices_until(today(), days).await
    }

    /// One row per (date, asset) for the `days` days ending at `end`
    pub async fn fetch_asset_prices_until(&self, end: NaiveDate, days: usize) -> Vec<PricePoint> {
        log::info!("Fetching asset prices for {} days", days);
        let dates = date_range(end, days);
        let Some(&start) = dates.first() else {
            return Vec::new();
        };

        let mut rows = Vec::with_capacity(dates.len() * PIPELINE_ASSETS.len());
        for asset in PIPELINE_ASSETS.iter() {
            let bars = match (&self.price_client, asset.provider_symbol) {
                (Some(client), Some(symbol)) => self.call_provider(client.as_ref(), symbol, start, end).await,
                _ => None,
            };

            let mut rng = self.rng.lock();
            let asset_rows = match bars {
                Some(bars) => {
                    log::info!("Using {} provider bars for {}", bars.len(), asset.id);
                    prices_from_bars(&mut *rng, asset, &bars)
                }
                None => {
                    log::warn!("No provider data for {}, generating mock prices", asset.id);
                    simulate_asset_prices(&mut *rng, asset, &dates)
                }
            };
            drop(rng);
            rows.extend(asset_rows);
        }

        log::info!("Fetched {} price records", rows.len());
        rows
    }

    pub async fn fetch_regional_data(&self, days: usize) -> Vec<RegionalPoint> {
        self.fetch_regional_data_until(today(), days).await
    }

    pub async fn fetch_regional_data_until(&self, end: NaiveDate, days: usize) -> Vec<RegionalPoint> {
        log::info!("Fetching regional data for {} days", days);
        let dates = date_range(end, days);
        let Some(&start) = dates.first() else {
            return Vec::new();
        };

        let us_yields: HashMap<NaiveDate, f64> = match &self.rates_client {
            Some(client) => self
                .call_provider(client.as_ref(), US_YIELD_SERIES, start, end)
                .await
                .map(|bars| bars.into_iter().map(|b| (b.date, b.close)).collect())
                .unwrap_or_default(),
            None => HashMap::new(),
        };

        let mut rows = Vec::with_capacity(dates.len() * REGIONS.len());
        {
            let mut rng = self.rng.lock();
            for region in REGIONS.iter() {
                let mut series = simulate_regional(&mut *rng, region, &dates);
                if region.id == BASE_REGION && !us_yields.is_empty() {
                    for point in series.iter_mut() {
                        if let Some(&observed) = us_yields.get(&point.date) {
                            point.bond_yield = observed;
                        }
                    }
                }
                rows.extend(series);
            }
        }

        log::info!("Fetched {} regional records", rows.len());
        rows
    }

    pub fn fetch_flow_data(&self, days: usize) -> Vec<FlowRecord> {
        self.fetch_flow_data_until(today(), days)
    }

    pub fn fetch_flow_data_until(&self, end: NaiveDate, days: usize) -> Vec<FlowRecord> {
        log::info!("Fetching flow data for {} days", days);
        let dates = date_range(end, days);
        let rows = simulate_flows(&mut *self.rng.lock(), &dates);
        log::info!("Fetched {} flow records", rows.len());
        rows
    }

    async fn call_provider(
        &self,
        client: &dyn MarketDataClient,
        id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Vec<SeriesBar>> {
        let bars = client.fetch_series(id, start, end).await;
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        bars
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `days` consecutive calendar days ending at `end`
pub fn date_range(end: NaiveDate, days: usize) -> Vec<NaiveDate> {
    (0..days as i64)
        .rev()
        .map(|offset| end - ChronoDuration::days(offset))
        .collect()
}

fn normal<R: Rng + ?Sized>(rng: &mut R, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std
}

fn simulate_volume<R: Rng + ?Sized>(rng: &mut R, asset: &AssetDescriptor) -> f64 {
    asset.base_market_cap / VOLUME_TO_MARKET_CAP * (1.0 + normal(rng, VOLUME_NOISE_STD))
}

/// Random walk from 100 with daily N(0, volatility) returns
pub fn simulate_asset_prices<R: Rng + ?Sized>(
    rng: &mut R,
    asset: &AssetDescriptor,
    dates: &[NaiveDate],
) -> Vec<PricePoint> {
    let mut prices = Vec::with_capacity(dates.len());
    let mut price = START_PRICE;
    for i in 0..dates.len() {
        if i > 0 {
            price *= 1.0 + normal(rng, asset.volatility);
        }
        prices.push(price);
    }
    let volumes: Vec<f64> = dates.iter().map(|_| simulate_volume(rng, asset)).collect();

    dates
        .iter()
        .zip(prices)
        .zip(volumes)
        .map(|((date, price), volume)| PricePoint {
            date: *date,
            asset_id: asset.id.to_string(),
            price,
            volume,
        })
        .collect()
}

/// Provider closes as prices; volume stays the market cap proxy
pub fn prices_from_bars<R: Rng + ?Sized>(rng: &mut R, asset: &AssetDescriptor, bars: &[SeriesBar]) -> Vec<PricePoint> {
    bars.iter()
        .map(|bar| PricePoint {
            date: bar.date,
            asset_id: asset.id.to_string(),
            price: bar.close,
            volume: simulate_volume(rng, asset),
        })
        .collect()
}

pub fn simulate_regional<R: Rng + ?Sized>(
    rng: &mut R,
    region: &RegionDescriptor,
    dates: &[NaiveDate],
) -> Vec<RegionalPoint> {
    let mut indices = Vec::with_capacity(dates.len());
    let mut index = region.base_index;
    for i in 0..dates.len() {
        if i > 0 {
            index *= 1.0 + normal(rng, INDEX_DAILY_STD);
        }
        indices.push(index);
    }

    let base_strength = if region.id == BASE_REGION {
        1.0
    } else {
        rng.gen_range(CURRENCY_STRENGTH_RANGE.0..CURRENCY_STRENGTH_RANGE.1)
    };
    let strengths: Vec<f64> = dates
        .iter()
        .map(|_| base_strength * (1.0 + normal(rng, CURRENCY_NOISE_STD)))
        .collect();
    let yields: Vec<f64> = dates
        .iter()
        .map(|_| region.base_yield * (1.0 + normal(rng, YIELD_NOISE_STD)))
        .collect();

    dates
        .iter()
        .enumerate()
        .map(|(i, date)| RegionalPoint {
            date: *date,
            region_id: region.id.to_string(),
            stock_index: indices[i],
            currency_strength: strengths[i],
            bond_yield: yields[i],
        })
        .collect()
}

/// 10 to 15 directed flows per day between distinct regions
pub fn simulate_flows<R: Rng + ?Sized>(rng: &mut R, dates: &[NaiveDate]) -> Vec<FlowRecord> {
    let region_ids: Vec<&str> = REGIONS.iter().map(|r| r.id).collect();
    let mut rows = Vec::new();

    for date in dates {
        let count = rng.gen_range(FLOWS_PER_DAY.0..=FLOWS_PER_DAY.1);
        for _ in 0..count {
            let Some(&source) = region_ids.choose(rng) else {
                continue;
            };
            let targets: Vec<&str> = region_ids.iter().copied().filter(|r| *r != source).collect();
            let Some(&target) = targets.choose(rng) else {
                continue;
            };
            let asset_class = FLOW_ASSET_CLASSES.choose(rng).copied().unwrap_or(AssetClass::Equities);
            let millions = rng.gen_range(FLOW_AMOUNT_RANGE_MILLIONS.0..FLOW_AMOUNT_RANGE_MILLIONS.1);

            rows.push(FlowRecord {
                date: *date,
                source: source.to_string(),
                target: target.to_string(),
                asset_class,
                amount: millions * 1_000_000.0,
            });
        }
    }
    rows
}

/// Keep the last row for every key, in input order
fn keep_last_by_key<T, K: Eq + Hash>(rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut last_index: HashMap<K, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        last_index.insert(key(row), i);
    }
    let keep: HashSet<usize> = last_index.into_values().collect();
    rows.into_iter()
        .enumerate()
        .filter_map(|(i, row)| keep.contains(&i).then_some(row))
        .collect()
}

pub fn clean_prices(rows: Vec<PricePoint>) -> Vec<PricePoint> {
    let before = rows.len();
    let rows: Vec<PricePoint> = rows
        .into_iter()
        .filter(|r| r.price.is_finite() && r.volume.is_finite())
        .collect();
    let mut rows = keep_last_by_key(rows, |r| (r.date, r.asset_id.clone()));
    rows.sort_by_key(|r| r.date);
    log::info!("Cleaned price data: {} of {} records remaining", rows.len(), before);
    rows
}

pub fn clean_regional(rows: Vec<RegionalPoint>) -> Vec<RegionalPoint> {
    let before = rows.len();
    let rows: Vec<RegionalPoint> = rows
        .into_iter()
        .filter(|r| r.stock_index.is_finite() && r.currency_strength.is_finite() && r.bond_yield.is_finite())
        .collect();
    let mut rows = keep_last_by_key(rows, |r| (r.date, r.region_id.clone()));
    rows.sort_by_key(|r| r.date);
    log::info!("Cleaned regional data: {} of {} records remaining", rows.len(), before);
    rows
}

/// Drop exact duplicates (first kept) and invalid amounts, then order by date
pub fn clean_flows(rows: Vec<FlowRecord>) -> Vec<FlowRecord> {
    let before = rows.len();
    let mut seen = HashSet::new();
    let mut rows: Vec<FlowRecord> = rows
        .into_iter()
        .filter(|r| r.amount.is_finite() && r.amount >= 0.0)
        .filter(|r| {
            seen.insert((
                r.date,
                r.source.clone(),
                r.target.clone(),
                r.asset_class,
                r.amount.to_bits(),
            ))
        })
        .collect();
    rows.sort_by_key(|r| r.date);
    log::info!("Cleaned flow data: {} of {} records remaining", rows.len(), before);
    rows
}

/// Market caps on `date`: volume proxy where present, registry base cap otherwise
pub fn market_caps_on(prices: &[PricePoint], date: Option<NaiveDate>) -> BTreeMap<String, f64> {
    PIPELINE_ASSETS
        .iter()
        .map(|asset| {
            let cap = date
                .and_then(|d| prices.iter().find(|p| p.date == d && p.asset_id == asset.id))
                .map(|p| p.volume * VOLUME_TO_MARKET_CAP)
                .unwrap_or(asset.base_market_cap);
            (asset.id.to_string(), cap)
        })
        .collect()
}

pub fn current_market_caps(prices: &[PricePoint]) -> BTreeMap<String, f64> {
    market_caps_on(prices, prices.iter().map(|p| p.date).max())
}

/// Caps on the date before the latest, if the table spans at least two dates
pub fn previous_market_caps(prices: &[PricePoint]) -> Option<BTreeMap<String, f64>> {
    let latest = prices.iter().map(|p| p.date).max()?;
    let previous = prices.iter().map(|p| p.date).filter(|d| *d < latest).max()?;
    Some(market_caps_on(prices, Some(previous)))
}

/// Latest-date metrics per configured region, falling back to registry values
pub fn current_regional_indices(regional: &[RegionalPoint]) -> BTreeMap<String, RegionMetricSnapshot> {
    let latest = regional.iter().map(|p| p.date).max();
    REGIONS
        .iter()
        .map(|region| {
            let snapshot = latest
                .and_then(|d| regional.iter().find(|p| p.date == d && p.region_id == region.id))
                .map(|p| RegionMetricSnapshot {
                    stock_index: p.stock_index,
                    currency_strength: p.currency_strength,
                    bond_yield: p.bond_yield,
                })
                .unwrap_or_else(|| fallback_snapshot(region));
            (region.id.to_string(), snapshot)
        })
        .collect()
}
