// src/domain/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broad investment category a flow record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equities,
    Bonds,
    Currency,
    Commodities,
    Crypto,
    Cash,
}

impl AssetClass {
    pub const ALL: [AssetClass; 6] = [
        AssetClass::Equities,
        AssetClass::Bonds,
        AssetClass::Currency,
        AssetClass::Commodities,
        AssetClass::Crypto,
        AssetClass::Cash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equities => "equities",
            AssetClass::Bonds => "bonds",
            AssetClass::Currency => "currency",
            AssetClass::Commodities => "commodities",
            AssetClass::Crypto => "crypto",
            AssetClass::Cash => "cash",
        }
    }

    /// Parse a stored asset class, defaulting unknown values to equities
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::warn!("Unknown asset class '{}', treating as equities", value);
            AssetClass::Equities
        })
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetClass::ALL
            .iter()
            .find(|class| class.as_str() == s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown asset class: {}", s))
    }
}

/// Aggregation window requested by the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    OneDay,
    #[default]
    OneWeek,
    OneMonth,
    ThreeMonths,
    OneYear,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::OneDay => "1D",
            TimeRange::OneWeek => "1W",
            TimeRange::OneMonth => "1M",
            TimeRange::ThreeMonths => "3M",
            TimeRange::OneYear => "1Y",
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1D" => Ok(TimeRange::OneDay),
            "1W" => Ok(TimeRange::OneWeek),
            "1M" => Ok(TimeRange::OneMonth),
            "3M" => Ok(TimeRange::ThreeMonths),
            "1Y" => Ok(TimeRange::OneYear),
            other => Err(format!(
                "timeRange must be one of 1D, 1W, 1M, 3M, 1Y (got '{}')",
                other
            )),
        }
    }
}

/// Whether a value came out of real aggregation or placeholder generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Derived,
    Synthetic,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Derived => "derived",
            Provenance::Synthetic => "synthetic",
        }
    }
}

/// Single observation of one entity on one day; the unit the metrics consume
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub entity_id: String,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(date: NaiveDate, entity_id: &str, value: f64) -> Self {
        Self {
            date,
            entity_id: entity_id.to_string(),
            value,
        }
    }
}

/// Daily asset price row
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub asset_id: String,
    pub price: f64,
    pub volume: f64,
}

impl PricePoint {
    pub fn to_series_point(&self) -> TimeSeriesPoint {
        TimeSeriesPoint::new(self.date, &self.asset_id, self.price)
    }
}

/// Convert a price table into the generic series the metrics operate on
pub fn price_series(prices: &[PricePoint]) -> Vec<TimeSeriesPoint> {
    prices.iter().map(PricePoint::to_series_point).collect()
}

/// Daily regional market row
#[derive(Debug, Clone, PartialEq)]
pub struct RegionalPoint {
    pub date: NaiveDate,
    pub region_id: String,
    pub stock_index: f64,
    pub currency_strength: f64,
    pub bond_yield: f64,
}

/// One directed capital movement between two regions
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub date: NaiveDate,
    pub source: String,
    pub target: String,
    pub asset_class: AssetClass,
    pub amount: f64,
}

/// Daily bar returned by an external data provider
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBar {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
}

/// Current value of the tracked metrics for one region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionMetricSnapshot {
    pub stock_index: f64,
    pub currency_strength: f64,
    pub bond_yield: f64,
}

/// Aggregated flow for one (source, target, asset class) on the latest date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BilateralFlowEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "assetType")]
    pub asset_class: AssetClass,
    pub amount: f64,
    pub net_flow_percent: f64,
}

/// Regional entry of the global flow payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionData {
    pub id: String,
    pub name: String,
    pub stock_index: f64,
    pub stock_change: f64,
    pub currency: String,
    pub currency_strength: f64,
    pub bond_yield: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalFlowData {
    pub timestamp: DateTime<Utc>,
    pub regions: Vec<RegionData>,
    pub flows: Vec<BilateralFlowEdge>,
}

/// Asset-class node of the industry graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetNode {
    pub id: String,
    pub size: f64,
    pub net_flow_pct: f64,
    pub market_cap: f64,
}

/// Undirected relationship between two asset classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    pub correlation: f64,
    pub flow_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryFlowData {
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<AssetNode>,
    pub edges: Vec<FlowEdge>,
}
