use crate::constants::{NAME_HEADER, USD_HEADER};
use crate::error::{EtlError, Result};
use crate::types::{EnrichedBankRecord, ReportTable};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

static CURRENCY_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^MC_([A-Za-z]{3})_Billion$").expect("valid header regex"));

/// Writes the report as CSV, replacing any existing file at `path`.
///
/// Rows go to a sibling `.tmp` file that is renamed over `path` once complete,
/// so a failed write leaves the previous report in place.
#[instrument(skip(table), fields(records = table.len()))]
pub fn persist_to_file(table: &ReportTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    let written = write_rows(table, &staging)
        .and_then(|()| fs::rename(&staging, path).map_err(EtlError::from));
    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    info!("Wrote {} records to {}", table.len(), path.display());
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_rows(table: &ReportTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.headers())?;
    for record in &table.records {
        let mut row = Vec::with_capacity(2 + record.converted.len());
        row.push(record.name.clone());
        row.push(record.market_cap_usd.to_string());
        row.extend(record.converted.iter().map(|v| v.to_string()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a report CSV back. Currency columns are discovered from their
/// `MC_<CODE>_Billion` headers.
pub fn read_report_file(path: &Path) -> Result<ReportTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let malformed = |what: String| {
        EtlError::Configuration(format!("report file {}: {}", path.display(), what))
    };
    if headers.get(0) != Some(NAME_HEADER) || headers.get(1) != Some(USD_HEADER) {
        return Err(malformed(format!(
            "expected '{},{}' as first columns",
            NAME_HEADER, USD_HEADER
        )));
    }
    let currencies = headers
        .iter()
        .skip(2)
        .map(|h| {
            CURRENCY_HEADER
                .captures(h)
                .map(|c| c[1].to_ascii_uppercase())
                .ok_or_else(|| malformed(format!("unexpected column '{}'", h)))
        })
        .collect::<Result<Vec<_>>>()?;

    let number = |field: &str| {
        field
            .parse::<f64>()
            .map_err(|_| malformed(format!("'{}' is not a number", field)))
    };
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let converted = row
            .iter()
            .skip(2)
            .map(number)
            .collect::<Result<Vec<_>>>()?;
        records.push(EnrichedBankRecord {
            name: row.get(0).unwrap_or_default().to_string(),
            market_cap_usd: number(row.get(1).unwrap_or_default())?,
            converted,
        });
    }
    Ok(ReportTable::new(currencies, records))
}
