use crate::constants::{currency_header, NAME_HEADER, USD_HEADER};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the source ranking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRecord {
    pub name: String,
    pub market_cap_usd: f64,
}

/// Currency code to USD multiplier, loaded once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRateTable {
    rates: HashMap<String, f64>,
}

impl ExchangeRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codes are stored upper-cased so lookups are case-insensitive.
    pub fn insert(&mut self, currency: &str, rate: f64) -> Option<f64> {
        self.rates.insert(currency.trim().to_ascii_uppercase(), rate)
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(&currency.trim().to_ascii_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for ExchangeRateTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut table = ExchangeRateTable::new();
        for (code, rate) in iter {
            table.insert(code.as_ref(), rate);
        }
        table
    }
}

/// A bank record with its market cap converted into each report currency.
/// `converted` follows the order of `ReportTable::currencies`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedBankRecord {
    pub name: String,
    pub market_cap_usd: f64,
    pub converted: Vec<f64>,
}

/// The ordered unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub currencies: Vec<String>,
    pub records: Vec<EnrichedBankRecord>,
}

impl ReportTable {
    pub fn new(currencies: Vec<String>, records: Vec<EnrichedBankRecord>) -> Self {
        Self {
            currencies,
            records,
        }
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![NAME_HEADER.to_string(), USD_HEADER.to_string()];
        headers.extend(self.currencies.iter().map(|c| currency_header(c)));
        headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A single value coming back from a report query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl std::fmt::Display for QueryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryValue::Null => write!(f, "NULL"),
            QueryValue::Integer(v) => write!(f, "{}", v),
            QueryValue::Real(v) => write!(f, "{}", v),
            QueryValue::Text(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<QueryValue>>,
}
