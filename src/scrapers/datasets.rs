use super::headers::HeaderTemplate;
use crate::config::Config;
use crate::errors::{DataHubError, Result};
use crate::models::EndpointRequest;
use reqwest::Url;

/// Index names fetched by `index_constituents` unless configured otherwise.
pub const DEFAULT_INDEX_NAMES: &[&str] = &[
    "NIFTY INDIA CONSUMPTION",
    "NIFTY FMCG",
    "INDIA VIX",
    "NIFTY METAL",
    "NIFTY IPO",
    "NIFTY FINANCIAL SERVICES EX-BANK",
    "NIFTY ALPHA QUALITY LOW-VOLATILITY 30",
    "NIFTY MIDSMALL INDIA CONSUMPTION",
    "NIFTY50 PR 1X INVERSE",
    "NIFTY INDIA CORPORATE GROUP INDEX - TATA GROUP 25% CAP",
    "NIFTY500 MULTICAP INDIA MANUFACTURING 50:30:20",
    "NIFTY50 DIVIDEND POINTS",
    "NIFTY500 MOMENTUM 50",
    "NIFTY QUALITY LOW-VOLATILITY 30",
    "NIFTY SHARIAH 25",
    "NIFTY100 LIQUID 15",
    "NIFTY50 TR 1X INVERSE",
    "NIFTY SMALLCAP250 MOMENTUM QUALITY 100",
    "NIFTY FINANCIAL SERVICES 25/50",
    "NIFTY CAPITAL MARKETS",
    "NIFTY TOP 10 EQUAL WEIGHT",
    "NIFTY BANK",
    "NIFTY PSU BANK",
    "NIFTY SERVICES SECTOR",
    "NIFTY 10 YR BENCHMARK G-SEC (CLEAN PRICE)",
    "NIFTY 11-15 YR G-SEC INDEX",
    "NIFTY50 PR 2X LEVERAGE",
    "NIFTY MIDSMALL IT & TELECOM",
    "NIFTY 100",
    "NIFTY SMALLCAP 250",
    "NIFTY MIDSMALLCAP400 MOMENTUM QUALITY 100",
    "NIFTY SMALLCAP 100",
    "NIFTY 500",
    "NIFTY MIDCAP LIQUID 15",
    "NIFTY INDIA DIGITAL",
    "NIFTY DIVIDEND OPPORTUNITIES 50",
    "NIFTY MEDIA",
    "NIFTY REALTY",
    "NIFTY HEALTHCARE INDEX",
    "NIFTY50 SHARIAH",
    "NIFTY NEXT 50",
    "NIFTY100 ENHANCED ESG",
    "NIFTY ALPHA QUALITY VALUE LOW-VOLATILITY 30",
    "NIFTY IT",
    "NIFTY PSE",
    "NIFTY500 SHARIAH",
    "NIFTY COMPOSITE G-SEC INDEX",
    "NIFTY COMMODITIES",
    "NIFTY100 LOW VOLATILITY 30",
    "NIFTY 10 YR BENCHMARK G-SEC",
    "NIFTY RURAL",
    "NIFTY PRIVATE BANK",
    "NIFTY100 ESG",
    "NIFTY MICROCAP 250",
    "NIFTY MIDCAP150 QUALITY 50",
    "NIFTY MIDSMALL HEALTHCARE",
    "NIFTY500 VALUE 50",
    "NIFTY500 MULTICAP MOMENTUM QUALITY 50",
    "NIFTY HOUSING",
    "NIFTY SMALLCAP 50",
    "NIFTY CPSE",
    "NIFTY50 EQUAL WEIGHT",
    "NIFTY INDIA MANUFACTURING",
    "NIFTY 50",
    "NIFTY100 EQUAL WEIGHT",
    "NIFTY200 QUALITY 30",
    "NIFTY200 MOMENTUM 30",
    "NIFTY100 ESG SECTOR LEADERS",
    "NIFTY50 VALUE 20",
    "NIFTY100 QUALITY 30",
    "NIFTY MIDSMALLCAP 400",
    "NIFTY INDIA SELECT 5 CORPORATE GROUPS (MAATR)",
    "NIFTY MIDSMALL FINANCIAL SERVICES",
    "NIFTY ALPHA LOW-VOLATILITY 30",
    "NIFTY CONSUMER DURABLES",
    "NIFTY500 LOW VOLATILITY 50",
    "NIFTY 8-13 YR G-SEC",
    "NIFTY MIDCAP 50",
    "NIFTY BHARAT BOND INDEX - APRIL 2033",
    "NIFTY OIL & GAS",
    "NIFTY200 VALUE 30",
    "NIFTY MNC",
    "NIFTY MIDCAP 100",
    "NIFTY50 TR 2X LEVERAGE",
    "NIFTY INDIA DEFENCE",
    "NIFTY TOP 15 EQUAL WEIGHT",
    "NIFTY100 ALPHA 30",
    "NIFTY 15 YR AND ABOVE G-SEC INDEX",
    "NIFTY TRANSPORTATION & LOGISTICS",
    "NIFTY500 MULTICAP INFRASTRUCTURE 50:30:20",
    "NIFTY BHARAT BOND INDEX - APRIL 2032",
    "NIFTY HIGH BETA 50",
    "NIFTY 200",
    "NIFTY INDIA TOURISM",
    "NIFTY BHARAT BOND INDEX - APRIL 2031",
    "NIFTY BHARAT BOND INDEX - APRIL 2030",
    "NIFTY PHARMA",
    "NIFTY INDIA NEW AGE CONSUMPTION",
    "NIFTY MIDCAP150 MOMENTUM 50",
    "NIFTY500 LARGEMIDSMALL EQUAL-CAP WEIGHTED",
    "NIFTY LARGEMIDCAP 250",
    "NIFTY MIDCAP 150",
    "NIFTY BHARAT BOND INDEX - APRIL 2025",
    "NIFTY 4-8 YR G-SEC INDEX",
    "NIFTY AUTO",
    "NIFTY NON-CYCLICAL CONSUMER",
    "NIFTY GROWTH SECTORS 15",
    "NIFTY FINANCIAL SERVICES",
    "NIFTY500 QUALITY 50",
    "NIFTY EV & NEW AGE AUTOMOTIVE",
    "NIFTY200 ALPHA 30",
    "NIFTY INFRASTRUCTURE",
    "NIFTY MIDCAP SELECT",
    "NIFTY TOTAL MARKET",
    "NIFTY SMALLCAP250 QUALITY 50",
    "NIFTY MOBILITY",
    "NIFTY500 MULTIFACTOR MQVLV 50",
    "NIFTY500 MULTICAP 50:25:25",
    "NIFTY ENERGY",
    "NIFTY LOW VOLATILITY 50",
    "NIFTY ALPHA 50",
    "NIFTY CORE HOUSING",
    "NIFTY500 EQUAL WEIGHT",
    "NIFTY TOP 20 EQUAL WEIGHT",
];

/// Column holding the index a constituent row was fetched for.
pub const INDEX_NAME_COLUMN: &str = "index_name";

/// Column holding the group key of grouped payloads.
pub const CATEGORY_COLUMN: &str = "category";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// Maps one source key of a payload row onto a canonical column.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub column: &'static str,
    pub source: &'static str,
    pub kind: FieldKind,
}

const fn text(column: &'static str, source: &'static str) -> FieldMapping {
    FieldMapping {
        column,
        source,
        kind: FieldKind::Text,
    }
}

const fn number(column: &'static str, source: &'static str) -> FieldMapping {
    FieldMapping {
        column,
        source,
        kind: FieldKind::Number,
    }
}

/// Where the row array lives inside a payload.
#[derive(Debug, Clone, Copy)]
pub enum RowSource {
    /// A JSON pointer to an array of row objects, e.g. `/data`.
    Pointer(&'static str),
    /// An object of `{group: {rows_key: [..]}}`; keys in `skip` are not groups.
    Grouped {
        rows_key: &'static str,
        skip: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub rows: RowSource,
    pub fields: &'static [FieldMapping],
}

#[derive(Debug, Clone, Copy)]
pub enum Endpoint {
    /// One request to a fixed path (with query).
    Fixed(&'static str),
    /// One request per configured index name, passed as `?index=`.
    PerIndex(&'static str),
}

/// A named exchange endpoint and the table its rows land in.
#[derive(Debug, Clone, Copy)]
pub struct Dataset {
    pub name: &'static str,
    pub table: &'static str,
    pub referer: &'static str,
    pub endpoint: Endpoint,
    pub layout: RecordLayout,
}

/// A request to issue for a dataset, with the index it targets if any.
#[derive(Debug, Clone)]
pub struct PlannedRequest {
    pub request: EndpointRequest,
    pub index_name: Option<String>,
}

impl Dataset {
    /// Build the requests for this dataset against the configured origin.
    pub fn plan(&self, config: &Config, headers: &HeaderTemplate) -> Result<Vec<PlannedRequest>> {
        let request_headers = headers.resolve(Some(self.referer));

        match self.endpoint {
            Endpoint::Fixed(path) => {
                let url = format!("{}{}", config.base_url, path);
                Ok(vec![PlannedRequest {
                    request: EndpointRequest::new(self.name, url, request_headers, config.request_timeout),
                    index_name: None,
                }])
            }
            Endpoint::PerIndex(path) => config
                .index_names
                .iter()
                .map(|index| {
                    let url = Url::parse_with_params(&format!("{}{}", config.base_url, path), &[("index", index)])
                        .map_err(|e| DataHubError::ConfigError(format!("invalid URL for index {}: {}", index, e)))?;
                    Ok(PlannedRequest {
                        request: EndpointRequest::new(
                            format!("{}:{}", self.name, index),
                            url.to_string(),
                            request_headers.clone(),
                            config.request_timeout,
                        ),
                        index_name: Some(index.clone()),
                    })
                })
                .collect(),
        }
    }

    /// Every column a record of this dataset carries, in layout order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if matches!(self.layout.rows, RowSource::Grouped { .. }) {
            columns.push(CATEGORY_COLUMN);
        }
        if matches!(self.endpoint, Endpoint::PerIndex(_)) {
            columns.push(INDEX_NAME_COLUMN);
        }
        columns.extend(self.layout.fields.iter().map(|f| f.column));
        columns
    }
}

const VARIATION_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("series", "series"),
    number("open_price", "open_price"),
    number("high_price", "high_price"),
    number("low_price", "low_price"),
    number("ltp", "ltp"),
    number("prev_price", "prev_price"),
    number("net_price", "net_price"),
    number("per_change", "perChange"),
    number("trade_quantity", "trade_quantity"),
    number("turnover", "turnover"),
    text("market_type", "market_type"),
    text("ca_ex_dt", "ca_ex_dt"),
    text("ca_purpose", "ca_purpose"),
];

const VARIATION_LAYOUT: RecordLayout = RecordLayout {
    rows: RowSource::Grouped {
        rows_key: "data",
        skip: &["legends"],
    },
    fields: VARIATION_FIELDS,
};

// The exchange misspells the company name key
const WEEK52_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("series", "series"),
    text("company_name", "comapnyName"),
    number("new_52w_hl", "new52WHL"),
    number("prev_52w_hl", "prev52WHL"),
    text("prev_hl_date", "prevHLDate"),
    number("ltp", "ltp"),
    number("prev_close", "prevClose"),
    number("change", "change"),
    number("percent_change", "pChange"),
];

const MOST_ACTIVE_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("identifier", "identifier"),
    number("last_price", "lastPrice"),
    number("change", "change"),
    number("percent_change", "pChange"),
    number("previous_close", "previousClose"),
    number("open", "open"),
    number("day_high", "dayHigh"),
    number("day_low", "dayLow"),
    number("quantity_traded", "quantityTraded"),
    number("total_traded_volume", "totalTradedVolume"),
    number("total_traded_value", "totalTradedValue"),
    number("year_high", "yearHigh"),
    number("year_low", "yearLow"),
    text("last_update_time", "lastUpdateTime"),
];

const BAND_HITTER_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("series", "series"),
    number("ltp", "ltp"),
    number("change", "change"),
    number("percent_change", "pChange"),
    number("previous_close", "previousClose"),
    number("total_traded_volume", "totalTradedVol"),
    number("turnover", "turnover"),
    number("price_band", "priceBand"),
];

const NEW_LISTING_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("series", "series"),
    text("company_name", "companyName"),
    number("issue_price", "issuePrice"),
    number("listing_price", "listingPrice"),
    number("last_price", "lastPrice"),
    number("change", "change"),
    number("percent_change", "pChange"),
    text("listing_date", "listingDate"),
];

const ALL_INDICES_FIELDS: &[FieldMapping] = &[
    text("index_key", "key"),
    text("index", "index"),
    text("index_symbol", "indexSymbol"),
    number("last", "last"),
    number("variation", "variation"),
    number("percent_change", "percentChange"),
    number("open", "open"),
    number("high", "high"),
    number("low", "low"),
    number("previous_close", "previousClose"),
    number("year_high", "yearHigh"),
    number("year_low", "yearLow"),
    number("pe", "pe"),
    number("pb", "pb"),
    number("dy", "dy"),
    number("advances", "advances"),
    number("declines", "declines"),
    number("unchanged", "unchanged"),
];

const CONSTITUENT_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("series", "series"),
    number("last_price", "lastPrice"),
    number("change", "change"),
    number("percent_change", "pChange"),
    number("open_price", "open"),
    number("high", "dayHigh"),
    number("low", "dayLow"),
    number("previous_close", "previousClose"),
    number("total_traded_volume", "totalTradedVolume"),
    number("total_traded_value", "totalTradedValue"),
    number("year_high", "yearHigh"),
    number("year_low", "yearLow"),
    number("near_wkh", "nearWKH"),
    number("near_wkl", "nearWKL"),
    number("per_change_365d", "perChange365d"),
    number("per_change_30d", "perChange30d"),
];

// Advance, decline and unchanged share one row shape
const BREADTH_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("series", "series"),
    number("open", "open"),
    number("day_high", "dayHigh"),
    number("day_low", "dayLow"),
    number("last_price", "lastPrice"),
    number("previous_close", "previousClose"),
    number("change", "change"),
    number("percent_change", "pChange"),
    number("total_traded_volume", "totalTradedVolume"),
    number("total_traded_value", "totalTradedValue"),
];

const LARGE_DEAL_FIELDS: &[FieldMapping] = &[
    text("date", "date"),
    text("symbol", "symbol"),
    text("name", "name"),
    text("client_name", "clientName"),
    text("buy_sell", "buySell"),
    number("quantity", "qty"),
    number("weighted_avg_price", "watp"),
    text("remarks", "remarks"),
];

const DERIVATIVE_FIELDS: &[FieldMapping] = &[
    text("identifier", "identifier"),
    text("instrument", "instrumentType"),
    text("underlying", "underlying"),
    text("expiry_date", "expiryDate"),
    text("option_type", "optionType"),
    number("strike_price", "strikePrice"),
    number("last_price", "lastPrice"),
    number("percent_change", "pChange"),
    number("contracts_traded", "numberOfContractsTraded"),
    number("total_turnover", "totalTurnover"),
    number("premium_turnover", "premiumTurnover"),
    number("open_interest", "openInterest"),
    number("underlying_value", "underlyingValue"),
];

const UNDERLYING_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    number("futures_volume", "futVolume"),
    number("options_volume", "optVolume"),
    number("total_volume", "totVolume"),
    number("futures_turnover", "futTurnover"),
    number("premium_turnover", "preTurnover"),
    number("total_turnover", "totTurnover"),
    number("open_interest", "latestOI"),
    number("underlying_value", "underlyingValue"),
];

const VOLUME_GAINER_FIELDS: &[FieldMapping] = &[
    text("symbol", "symbol"),
    text("company_name", "companyName"),
    number("volume", "volume"),
    number("week1_avg_volume", "week1AvgVolume"),
    number("week1_volume_change", "week1volChange"),
    number("week2_avg_volume", "week2AvgVolume"),
    number("week2_volume_change", "week2volChange"),
    number("ltp", "ltp"),
    number("percent_change", "pChange"),
    number("turnover", "turnover"),
];

const fn rows_at(pointer: &'static str, fields: &'static [FieldMapping]) -> RecordLayout {
    RecordLayout {
        rows: RowSource::Pointer(pointer),
        fields,
    }
}

const fn grouped(fields: &'static [FieldMapping]) -> RecordLayout {
    RecordLayout {
        rows: RowSource::Grouped {
            rows_key: "data",
            skip: &["legends", "timestamp"],
        },
        fields,
    }
}

/// Every dataset the scraper knows.
pub static DATASETS: &[Dataset] = &[
    Dataset {
        name: "top_gainers",
        table: "top_gainers",
        referer: "market-data/top-gainers-loosers",
        endpoint: Endpoint::Fixed("/api/live-analysis-variations?index=gainers"),
        layout: VARIATION_LAYOUT,
    },
    Dataset {
        name: "top_losers",
        table: "top_losers",
        referer: "market-data/top-gainers-loosers",
        endpoint: Endpoint::Fixed("/api/live-analysis-variations?index=loosers"),
        layout: VARIATION_LAYOUT,
    },
    Dataset {
        name: "week52_high",
        table: "week52_high",
        referer: "market-data/52-week-high-equity-market",
        endpoint: Endpoint::Fixed("/api/live-analysis-data-52weekhighstock"),
        layout: rows_at("/data", WEEK52_FIELDS),
    },
    Dataset {
        name: "week52_low",
        table: "week52_low",
        referer: "market-data/52-week-low-equity-market",
        endpoint: Endpoint::Fixed("/api/live-analysis-data-52weeklowstock"),
        layout: rows_at("/data", WEEK52_FIELDS),
    },
    Dataset {
        name: "most_active_value",
        table: "most_active_value",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-securities?index=value"),
        layout: rows_at("/data", MOST_ACTIVE_FIELDS),
    },
    Dataset {
        name: "most_active_volume",
        table: "most_active_volume",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-securities?index=volume"),
        layout: rows_at("/data", MOST_ACTIVE_FIELDS),
    },
    Dataset {
        name: "upper_band_hitters",
        table: "upper_band_hitters",
        referer: "market-data/upper-band-hitters",
        endpoint: Endpoint::Fixed("/api/live-analysis-price-band-hitter"),
        layout: rows_at("/upper/AllSec/data", BAND_HITTER_FIELDS),
    },
    Dataset {
        name: "lower_band_hitters",
        table: "lower_band_hitters",
        referer: "market-data/lower-band-hitters",
        endpoint: Endpoint::Fixed("/api/live-analysis-price-band-hitter"),
        layout: rows_at("/lower/AllSec/data", BAND_HITTER_FIELDS),
    },
    Dataset {
        name: "new_listings",
        table: "new_listings",
        referer: "market-data/new-stock-exchange-listings-today",
        endpoint: Endpoint::Fixed("/api/new-listing-today-ipo?index=NewListing"),
        layout: rows_at("/data", NEW_LISTING_FIELDS),
    },
    Dataset {
        name: "all_indices",
        table: "all_indices",
        referer: "market-data/live-equity-market",
        endpoint: Endpoint::Fixed("/api/allIndices"),
        layout: rows_at("/data", ALL_INDICES_FIELDS),
    },
    Dataset {
        name: "index_constituents",
        table: "index_constituents",
        referer: "market-data/live-equity-market",
        endpoint: Endpoint::PerIndex("/api/equity-stockIndices"),
        layout: rows_at("/data", CONSTITUENT_FIELDS),
    },
    Dataset {
        name: "top_gainers_below_20",
        table: "top_gainers_below_20",
        referer: "market-data/top-gainers-loosers",
        endpoint: Endpoint::Fixed("/api/live-analysis-variations?index=gainers&key=SecLwr20"),
        layout: VARIATION_LAYOUT,
    },
    Dataset {
        name: "top_gainers_above_20",
        table: "top_gainers_above_20",
        referer: "market-data/top-gainers-loosers",
        endpoint: Endpoint::Fixed("/api/live-analysis-variations?index=gainers&key=SecGtr20"),
        layout: VARIATION_LAYOUT,
    },
    Dataset {
        name: "most_active_sme_value",
        table: "most_active_sme_value",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-sme?index=value"),
        layout: rows_at("/data", MOST_ACTIVE_FIELDS),
    },
    Dataset {
        name: "most_active_sme_volume",
        table: "most_active_sme_volume",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-sme?index=volume"),
        layout: rows_at("/data", MOST_ACTIVE_FIELDS),
    },
    Dataset {
        name: "most_active_etf_value",
        table: "most_active_etf_value",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-etf?index=value"),
        layout: rows_at("/data", MOST_ACTIVE_FIELDS),
    },
    Dataset {
        name: "most_active_etf_volume",
        table: "most_active_etf_volume",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-etf?index=volume"),
        layout: rows_at("/data", MOST_ACTIVE_FIELDS),
    },
    Dataset {
        name: "volume_gainers",
        table: "volume_gainers",
        referer: "market-data/most-active-equities",
        endpoint: Endpoint::Fixed("/api/live-analysis-volume-gainers"),
        layout: rows_at("/data", VOLUME_GAINER_FIELDS),
    },
    Dataset {
        name: "advances",
        table: "advances",
        referer: "market-data/advance",
        endpoint: Endpoint::Fixed("/api/live-analysis-advance"),
        layout: rows_at("/advance/data", BREADTH_FIELDS),
    },
    Dataset {
        name: "declines",
        table: "declines",
        referer: "market-data/decline",
        endpoint: Endpoint::Fixed("/api/live-analysis-decline"),
        layout: rows_at("/decline/data", BREADTH_FIELDS),
    },
    Dataset {
        name: "unchanged",
        table: "unchanged",
        referer: "market-data/unchanged",
        endpoint: Endpoint::Fixed("/api/live-analysis-unchanged"),
        layout: rows_at("/unchanged/data", BREADTH_FIELDS),
    },
    Dataset {
        name: "bulk_deals",
        table: "bulk_deals",
        referer: "market-data/large-deals",
        endpoint: Endpoint::Fixed("/api/snapshot-capital-market-largedeal"),
        layout: rows_at("/BULK_DEALS_DATA", LARGE_DEAL_FIELDS),
    },
    Dataset {
        name: "block_deals",
        table: "block_deals",
        referer: "market-data/large-deals",
        endpoint: Endpoint::Fixed("/api/snapshot-capital-market-largedeal"),
        layout: rows_at("/BLOCK_DEALS_DATA", LARGE_DEAL_FIELDS),
    },
    Dataset {
        name: "short_deals",
        table: "short_deals",
        referer: "market-data/large-deals",
        endpoint: Endpoint::Fixed("/api/snapshot-capital-market-largedeal"),
        layout: rows_at("/SHORT_DEALS_DATA", LARGE_DEAL_FIELDS),
    },
    Dataset {
        name: "most_active_contracts",
        table: "most_active_contracts",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=contracts&limit=50"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_futures",
        table: "most_active_futures",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=futures"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_options",
        table: "most_active_options",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=options&limit=50"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_puts_index_volume",
        table: "most_active_puts_index_volume",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=puts-index-vol"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_calls_stocks_volume",
        table: "most_active_calls_stocks_volume",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=calls-stocks-vol"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_puts_stocks_volume",
        table: "most_active_puts_stocks_volume",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=puts-stocks-vol"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_open_interest",
        table: "most_active_open_interest",
        referer: "market-data/most-active-contracts",
        endpoint: Endpoint::Fixed("/api/snapshot-derivatives-equity?index=oi"),
        layout: grouped(DERIVATIVE_FIELDS),
    },
    Dataset {
        name: "most_active_underlying",
        table: "most_active_underlying",
        referer: "market-data/most-active-underlying",
        endpoint: Endpoint::Fixed("/api/live-analysis-most-active-underlying"),
        layout: rows_at("/data", UNDERLYING_FIELDS),
    },
    Dataset {
        name: "recent_listings",
        table: "recent_listings",
        referer: "market-data/new-stock-exchange-listings-recent",
        endpoint: Endpoint::Fixed("/api/new-listing-today?index=RecentListing"),
        layout: rows_at("/data", NEW_LISTING_FIELDS),
    },
    Dataset {
        name: "forthcoming_listings",
        table: "forthcoming_listings",
        referer: "market-data/new-stock-exchange-listings-forthcoming",
        endpoint: Endpoint::Fixed("/api/new-listing-today?index=ForthListing"),
        layout: rows_at("/data", NEW_LISTING_FIELDS),
    },
    Dataset {
        name: "special_preopen_listings",
        table: "special_preopen_listings",
        referer: "market-data/new-stock-exchange-listings-today",
        endpoint: Endpoint::Fixed("/api/special-preopen-listing"),
        layout: rows_at("/data", NEW_LISTING_FIELDS),
    },
];

pub fn find_dataset(name: &str) -> Option<&'static Dataset> {
    DATASETS.iter().find(|d| d.name == name)
}

pub fn dataset_names() -> Vec<&'static str> {
    DATASETS.iter().map(|d| d.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::is_valid_table_name;
    use reqwest::header::REFERER;

    fn headers(config: &Config) -> HeaderTemplate {
        HeaderTemplate::new(&config.base_url, &config.user_agent).unwrap()
    }

    #[test]
    fn catalogue_tables_are_valid_and_unique() {
        let mut tables: Vec<&str> = DATASETS.iter().map(|d| d.table).collect();
        assert!(tables.iter().all(|t| is_valid_table_name(t)));
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), DATASETS.len());
    }

    #[test]
    fn fixed_endpoint_plans_one_request() {
        let config = Config::new();
        let dataset = find_dataset("top_losers").unwrap();
        let planned = dataset.plan(&config, &headers(&config)).unwrap();

        assert_eq!(planned.len(), 1);
        assert_eq!(
            planned[0].request.url,
            "https://www.nseindia.com/api/live-analysis-variations?index=loosers"
        );
        assert_eq!(
            planned[0].request.headers.get(REFERER).unwrap(),
            "https://www.nseindia.com/market-data/top-gainers-loosers"
        );
        assert_eq!(planned[0].request.timeout, config.request_timeout);
    }

    #[test]
    fn per_index_endpoint_fans_out() {
        let config = Config::new().with_index_names(vec!["NIFTY 50".into(), "NIFTY OIL & GAS".into()]);
        let dataset = find_dataset("index_constituents").unwrap();
        let planned = dataset.plan(&config, &headers(&config)).unwrap();

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].index_name.as_deref(), Some("NIFTY 50"));
        assert_eq!(planned[1].request.key, "index_constituents:NIFTY OIL & GAS");

        let url = Url::parse(&planned[1].request.url).unwrap();
        let index: Vec<_> = url.query_pairs().filter(|(k, _)| k == "index").map(|(_, v)| v.into_owned()).collect();
        assert_eq!(index, vec!["NIFTY OIL & GAS"]);
    }

    #[test]
    fn columns_include_context_columns() {
        let gainers = find_dataset("top_gainers").unwrap().columns();
        assert_eq!(gainers[0], CATEGORY_COLUMN);
        let constituents = find_dataset("index_constituents").unwrap().columns();
        assert_eq!(constituents[0], INDEX_NAME_COLUMN);
    }

    #[test]
    fn derivative_and_listing_endpoints_keep_their_queries() {
        let config = Config::new();
        let plan = |name: &str| find_dataset(name).unwrap().plan(&config, &headers(&config)).unwrap();

        let contracts = plan("most_active_contracts");
        assert_eq!(
            contracts[0].request.url,
            "https://www.nseindia.com/api/snapshot-derivatives-equity?index=contracts&limit=50"
        );
        assert_eq!(
            contracts[0].request.headers.get(REFERER).unwrap(),
            "https://www.nseindia.com/market-data/most-active-contracts"
        );

        let forthcoming = plan("forthcoming_listings");
        assert_eq!(forthcoming[0].request.url, "https://www.nseindia.com/api/new-listing-today?index=ForthListing");
        assert_eq!(
            forthcoming[0].request.headers.get(REFERER).unwrap(),
            "https://www.nseindia.com/market-data/new-stock-exchange-listings-forthcoming"
        );
    }

    #[test]
    fn deal_tables_share_one_endpoint() {
        let deals: Vec<&Dataset> = ["bulk_deals", "block_deals", "short_deals"]
            .iter()
            .map(|name| find_dataset(name).unwrap())
            .collect();
        assert!(deals
            .iter()
            .all(|d| matches!(d.endpoint, Endpoint::Fixed("/api/snapshot-capital-market-largedeal"))));
        assert!(deals.iter().all(|d| d.referer == "market-data/large-deals"));
    }

    #[test]
    fn default_index_list_is_complete_and_distinct() {
        let mut names = DEFAULT_INDEX_NAMES.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), DEFAULT_INDEX_NAMES.len());
        assert!(names.contains(&"NIFTY 50") && names.contains(&"NIFTY BHARAT BOND INDEX - APRIL 2033"));
        assert!(DEFAULT_INDEX_NAMES.iter().all(|n| !n.contains(',')));
        assert_eq!(Config::new().index_names.len(), DEFAULT_INDEX_NAMES.len());
    }
}
