use crate::error::{EtlError, Result};
use crate::types::{BankRecord, EnrichedBankRecord, ExchangeRateTable, ReportTable};
use tracing::{info, instrument};

/// Rounds half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Converts each record's USD market cap into `currencies`, in that order.
///
/// Every currency must have a rate; a missing one fails the whole transform
/// before any output is produced. Output keeps input order and count.
#[instrument(skip(records, rates), fields(count = records.len()))]
pub fn transform(
    records: &[BankRecord],
    rates: &ExchangeRateTable,
    currencies: &[String],
) -> Result<ReportTable> {
    let multipliers = currencies
        .iter()
        .map(|currency| {
            rates.rate(currency).ok_or_else(|| {
                EtlError::Configuration(format!("no exchange rate for currency {}", currency))
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    let enriched = records
        .iter()
        .map(|record| EnrichedBankRecord {
            name: record.name.clone(),
            market_cap_usd: record.market_cap_usd,
            converted: multipliers
                .iter()
                .map(|rate| round2(record.market_cap_usd * rate))
                .collect(),
        })
        .collect::<Vec<_>>();

    info!("Transformed {} records into {:?}", enriched.len(), currencies);
    Ok(ReportTable::new(
        currencies.iter().map(|c| c.trim().to_ascii_uppercase()).collect(),
        enriched,
    ))
}
