use crate::config::{EtlConfig, MissingStructurePolicy};
use crate::error::Result;
use crate::extract::{extract, DocumentSource, ExtractOutcome};
use crate::load::{persist_to_file, ReportDatabase, RunLock};
use crate::rates::load_exchange_rates;
use crate::transform::transform;
use crate::types::{QueryResult, ReportTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

/// Result of a complete report run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub source: String,
    pub outcome: ExtractOutcome,
    pub extracted_records: usize,
    pub report_rows: usize,
    /// False when persistence was skipped because the source table was missing.
    pub loaded: bool,
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub table_name: String,
    pub queries: Vec<QueryResult>,
}

pub struct Pipeline {
    config: EtlConfig,
}

impl Pipeline {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Extract, transform, persist and query, each stage completing before the next.
    #[instrument(skip(self, source), fields(location = %source.location()))]
    pub async fn run(&self, source: &dyn DocumentSource) -> Result<RunSummary> {
        let config = &self.config;
        let started_at = Utc::now();
        let _lock = RunLock::acquire(config.lock_path())?;

        let rates = load_exchange_rates(&config.rates_path)?;
        let extraction = extract(source, &config.locator()).await?;
        let report = transform(&extraction.records, &rates, &config.currency_codes())?;

        let mut summary = RunSummary {
            started_at,
            source: source.location().to_string(),
            outcome: extraction.outcome.clone(),
            extracted_records: extraction.records.len(),
            report_rows: report.len(),
            loaded: false,
            csv_path: config.csv_path.clone(),
            db_path: config.db_path.clone(),
            table_name: config.table_name.clone(),
            queries: Vec::new(),
        };

        if extraction.structure_missing()
            && config.on_missing_structure == MissingStructurePolicy::SkipLoad
        {
            error!(
                "Ranking table not found on {}; keeping the previous report at {} and {}",
                summary.source,
                config.csv_path.display(),
                config.db_path.display()
            );
            return Ok(summary);
        }
        if report.is_empty() {
            warn!("Report has no rows; persisting an empty table");
        }

        summary.queries = self.load_and_query(&report)?;
        summary.loaded = true;
        info!("Run complete: {} rows reported", summary.report_rows);
        Ok(summary)
    }

    /// Replaces the database table, then the CSV, then runs the report queries
    /// on one connection that is closed before returning. The CSV is only
    /// rewritten once the database transaction has committed.
    fn load_and_query(&self, report: &ReportTable) -> Result<Vec<QueryResult>> {
        let config = &self.config;
        let mut db = ReportDatabase::open(&config.db_path)?;
        db.persist_to_database(report, &config.table_name)?;

        persist_to_file(report, &config.csv_path)?;

        let results = config
            .resolved_queries()
            .iter()
            .map(|query| db.run_query(query))
            .collect::<Result<Vec<_>>>()?;

        db.close()?;
        Ok(results)
    }
}
