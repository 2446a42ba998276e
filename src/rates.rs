use crate::error::{EtlError, Result};
use crate::types::ExchangeRateTable;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, instrument};

/// Loads the `Currency,Rate` table from a CSV file.
#[instrument]
pub fn load_exchange_rates(path: &Path) -> Result<ExchangeRateTable> {
    let file = File::open(path)?;
    let rates = read_exchange_rates(file)?;
    info!("Loaded {} exchange rates", rates.len());
    Ok(rates)
}

/// Reads exchange rates from any CSV source. Header names are matched
/// case-insensitively; extra columns are ignored.
pub fn read_exchange_rates<R: Read>(reader: R) -> Result<ExchangeRateTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                EtlError::Configuration(format!("exchange rate file has no '{}' column", name))
            })
    };
    let currency_col = column("Currency")?;
    let rate_col = column("Rate")?;

    let mut table = ExchangeRateTable::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let currency = row.get(currency_col).unwrap_or_default();
        let raw_rate = row.get(rate_col).unwrap_or_default();
        if currency.is_empty() {
            return Err(EtlError::Configuration(format!(
                "exchange rate row {} has no currency code",
                line + 1
            )));
        }
        let rate: f64 = raw_rate.parse().map_err(|_| {
            EtlError::Configuration(format!("rate '{}' for {} is not a number", raw_rate, currency))
        })?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EtlError::Configuration(format!(
                "rate for {} must be positive, got {}",
                currency, rate
            )));
        }
        if table.insert(currency, rate).is_some() {
            return Err(EtlError::Configuration(format!(
                "currency {} appears more than once",
                currency
            )));
        }
    }
    Ok(table)
}
