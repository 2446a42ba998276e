use crate::config::TableLocator;
use crate::constants::MISSING_VALUE_MARKERS;
use crate::error::{EtlError, Result};
use crate::types::BankRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

static FOOTNOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid footnote regex"));
static GROUPED_THOUSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid thousands regex"));

/// Rows read from the located table, before any transformation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub records: Vec<BankRecord>,
    /// Data rows seen, header excluded.
    pub rows_seen: usize,
    pub rows_skipped: usize,
    pub parse_failures: usize,
    /// Every skipped row with its 1-based position among data rows.
    pub skipped: Vec<(usize, SkipReason)>,
}

/// Why a data row produced no record.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Malformed,
    EmptyName,
    EmptyValue,
    MissingMarker,
    Unparsable { raw: String },
}

enum RowOutcome {
    Record(BankRecord),
    Skipped(SkipReason),
    Unparsable(EtlError),
}

/// Locates the ranking table under `locator.section_anchor` and reads one
/// record per valid data row, in source order.
pub fn parse_bank_table(html: &str, locator: &TableLocator) -> Result<ParsedTable> {
    let table_selector = Selector::parse(&locator.table_selector).map_err(|e| {
        EtlError::Configuration(format!(
            "invalid table selector '{}': {:?}",
            locator.table_selector, e
        ))
    })?;
    let row_selector = Selector::parse("tr").expect("valid row selector");
    let cell_selector = Selector::parse("td").expect("valid cell selector");

    let document = Html::parse_document(html);

    // Pre-order traversal is document order: find the anchor, then the first
    // matching table after it.
    let mut nodes = document.root_element().descendants();
    let anchor = locator.section_anchor.as_str();
    let anchor_found = nodes
        .by_ref()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().id() == Some(anchor));
    if !anchor_found {
        return Err(EtlError::StructureNotFound(format!(
            "no element with id '{}'",
            anchor
        )));
    }
    let table = nodes
        .filter_map(ElementRef::wrap)
        .find(|el| table_selector.matches(el))
        .ok_or_else(|| {
            EtlError::StructureNotFound(format!(
                "no '{}' after section '{}'",
                locator.table_selector, anchor
            ))
        })?;

    let mut parsed = ParsedTable::default();
    for (index, row) in table.select(&row_selector).enumerate().skip(1) {
        parsed.rows_seen += 1;
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        match read_row(&cells, locator) {
            RowOutcome::Record(record) => parsed.records.push(record),
            RowOutcome::Unparsable(err) => {
                warn!("Skipping row {}: {}", index, err);
                parsed.rows_skipped += 1;
                parsed.parse_failures += 1;
                if let EtlError::RowParse { raw, .. } = err {
                    parsed.skipped.push((index, SkipReason::Unparsable { raw }));
                }
            }
            RowOutcome::Skipped(reason) => {
                info!("Skipping row {}: {:?}", index, reason);
                parsed.rows_skipped += 1;
                parsed.skipped.push((index, reason));
            }
        }
    }

    Ok(parsed)
}

fn read_row(cells: &[ElementRef], locator: &TableLocator) -> RowOutcome {
    let (Some(name_cell), Some(value_cell)) =
        (cells.get(locator.name_column), cells.get(locator.value_column))
    else {
        return RowOutcome::Skipped(SkipReason::Malformed);
    };

    let name = collapse_whitespace(&name_cell.text().collect::<String>());
    if name.is_empty() {
        return RowOutcome::Skipped(SkipReason::EmptyName);
    }

    let raw = value_cell.text().collect::<String>();
    let raw: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if raw.is_empty() {
        return RowOutcome::Skipped(SkipReason::EmptyValue);
    }
    if is_missing_marker(&raw) {
        return RowOutcome::Skipped(SkipReason::MissingMarker);
    }

    match parse_market_cap(&raw) {
        Some(market_cap_usd) => RowOutcome::Record(BankRecord {
            name,
            market_cap_usd,
        }),
        None => RowOutcome::Unparsable(EtlError::RowParse { name, raw }),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_missing_marker(value: &str) -> bool {
    MISSING_VALUE_MARKERS.iter().any(|m| value.contains(m))
}

/// Parses a market cap figure such as `432.92`, `1,234.5` or `88.4[3]`.
/// Only finite, non-negative values are accepted.
pub fn parse_market_cap(raw: &str) -> Option<f64> {
    let cleaned = FOOTNOTE.replace_all(raw.trim(), "");
    let cleaned: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    // Commas are only accepted as thousands separators, e.g. `1,234.5`.
    let cleaned = if cleaned.contains(',') {
        if !GROUPED_THOUSANDS.is_match(&cleaned) {
            return None;
        }
        cleaned.replace(',', "")
    } else {
        cleaned
    };
    let value: f64 = cleaned.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}
