// src/domain/catalog.rs
// Fixed registry of the regions and asset classes the service tracks

/// Economic bloc tracked for index, currency and yield metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub currency: &'static str,
    pub base_index: f64,
    pub base_yield: f64,
}

impl RegionDescriptor {
    /// Currency strength used when a region has no data on the latest date
    pub fn fallback_currency_strength(&self) -> f64 {
        if self.id == BASE_REGION {
            1.0
        } else {
            0.9
        }
    }
}

/// Region whose currency everything else is measured against
pub const BASE_REGION: &str = "usa";

pub const REGIONS: [RegionDescriptor; 5] = [
    RegionDescriptor { id: "usa", name: "USA", currency: "USD", base_index: 5247.89, base_yield: 4.32 },
    RegionDescriptor { id: "china", name: "China", currency: "CNY", base_index: 3187.42, base_yield: 2.68 },
    RegionDescriptor { id: "europe", name: "Europe", currency: "EUR", base_index: 4892.15, base_yield: 2.95 },
    RegionDescriptor { id: "japan", name: "Japan", currency: "JPY", base_index: 38764.32, base_yield: 0.75 },
    RegionDescriptor { id: "india", name: "India", currency: "INR", base_index: 72458.79, base_yield: 7.18 },
];

pub fn region(id: &str) -> Option<&'static RegionDescriptor> {
    REGIONS.iter().find(|r| r.id == id)
}

pub fn region_ids() -> Vec<&'static str> {
    REGIONS.iter().map(|r| r.id).collect()
}

/// Asset tracked by the series pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub base_market_cap: f64,
    pub volatility: f64,
    /// Provider symbol; `CRYPTO:` prefix selects the digital currency endpoint
    pub provider_symbol: Option<&'static str>,
}

pub const PIPELINE_ASSETS: [AssetDescriptor; 5] = [
    AssetDescriptor { id: "stocks", name: "Stocks", base_market_cap: 95e12, volatility: 0.15, provider_symbol: Some("SPY") },
    AssetDescriptor { id: "bonds", name: "Bonds", base_market_cap: 128e12, volatility: 0.08, provider_symbol: Some("AGG") },
    AssetDescriptor { id: "commodities", name: "Commodities", base_market_cap: 21e12, volatility: 0.20, provider_symbol: Some("GSG") },
    AssetDescriptor { id: "crypto", name: "Crypto", base_market_cap: 2.3e12, volatility: 0.35, provider_symbol: Some("CRYPTO:BTC") },
    AssetDescriptor { id: "cash", name: "Cash", base_market_cap: 45e12, volatility: 0.01, provider_symbol: None },
];

pub fn pipeline_asset(id: &str) -> Option<&'static AssetDescriptor> {
    PIPELINE_ASSETS.iter().find(|a| a.id == id)
}

/// Node of the industry flow graph, base market cap in billions USD
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndustryAsset {
    pub id: &'static str,
    pub base_market_cap: f64,
}

pub const INDUSTRY_ASSETS: [IndustryAsset; 5] = [
    IndustryAsset { id: "Stocks", base_market_cap: 41000.0 },
    IndustryAsset { id: "Bonds", base_market_cap: 25000.0 },
    IndustryAsset { id: "Commodities", base_market_cap: 8000.0 },
    IndustryAsset { id: "Crypto", base_market_cap: 3500.0 },
    IndustryAsset { id: "Cash", base_market_cap: 15000.0 },
];

/// FRED series carrying the US 10-year treasury yield
pub const US_YIELD_SERIES: &str = "DGS10";
