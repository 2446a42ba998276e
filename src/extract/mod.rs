pub mod fetch;
pub mod parser;

pub use fetch::{DocumentSource, HttpDocumentSource, StaticDocument};
pub use parser::{parse_bank_table, parse_market_cap, ParsedTable};

use crate::config::TableLocator;
use crate::error::{EtlError, Result};
use crate::types::BankRecord;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractOutcome {
    /// The ranking table was located; it may still have produced no records.
    Table {
        rows_seen: usize,
        rows_skipped: usize,
        parse_failures: usize,
    },
    /// The section or table is gone from the page.
    StructureNotFound { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub records: Vec<BankRecord>,
    pub outcome: ExtractOutcome,
}

impl Extraction {
    pub fn structure_missing(&self) -> bool {
        matches!(self.outcome, ExtractOutcome::StructureNotFound { .. })
    }
}

/// Fetches the source document and reads its ranking table.
///
/// Fetch failures are returned as errors. A page whose section or table
/// cannot be located yields an empty extraction instead, so later stages
/// can decide how to treat it.
#[instrument(skip(source, locator), fields(location = %source.location()))]
pub async fn extract(source: &dyn DocumentSource, locator: &TableLocator) -> Result<Extraction> {
    info!("Extraction started");
    let bytes = source.fetch().await?;
    // The page's declared encoding is not reliable; invalid sequences are replaced.
    let html = String::from_utf8_lossy(&bytes);

    match parse_bank_table(&html, locator) {
        Ok(parsed) => {
            info!(
                "Extraction complete: {} records from {} rows ({} skipped)",
                parsed.records.len(),
                parsed.rows_seen,
                parsed.rows_skipped
            );
            if parsed.parse_failures > 0 {
                warn!("{} rows had unparsable market cap values", parsed.parse_failures);
            }
            Ok(Extraction {
                records: parsed.records,
                outcome: ExtractOutcome::Table {
                    rows_seen: parsed.rows_seen,
                    rows_skipped: parsed.rows_skipped,
                    parse_failures: parsed.parse_failures,
                },
            })
        }
        Err(EtlError::StructureNotFound(reason)) => {
            error!(
                "Source page structure changed, no ranking table extracted: {}",
                reason
            );
            Ok(Extraction {
                records: Vec::new(),
                outcome: ExtractOutcome::StructureNotFound { reason },
            })
        }
        Err(e) => Err(e),
    }
}
