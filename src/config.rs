use crate::constants::*;
use crate::error::{EtlError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static SQL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{3}$").expect("valid currency regex"));

/// What to do when the ranking table cannot be found on the source page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MissingStructurePolicy {
    /// Keep the previously persisted report untouched.
    #[default]
    SkipLoad,
    /// Persist an empty report, replacing the previous one.
    WriteEmpty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in milliseconds, covering connect and body.
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `retry` (1-based), doubling and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Where the ranking table lives on the source page and which cells to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLocator {
    pub section_anchor: String,
    pub table_selector: String,
    pub name_column: usize,
    pub value_column: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub source_url: String,
    pub section_anchor: String,
    pub table_selector: String,
    pub name_column: usize,
    pub value_column: usize,
    pub rates_path: PathBuf,
    pub csv_path: PathBuf,
    pub db_path: PathBuf,
    pub table_name: String,
    pub currencies: Vec<String>,
    pub fetch: FetchConfig,
    pub queries: Vec<String>,
    pub on_missing_structure: MissingStructurePolicy,
    pub log_dir: PathBuf,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            section_anchor: DEFAULT_SECTION_ANCHOR.to_string(),
            table_selector: DEFAULT_TABLE_SELECTOR.to_string(),
            name_column: DEFAULT_NAME_COLUMN,
            value_column: DEFAULT_VALUE_COLUMN,
            rates_path: PathBuf::from(DEFAULT_RATES_PATH),
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            currencies: DEFAULT_CURRENCIES.iter().map(|c| c.to_string()).collect(),
            fetch: FetchConfig::default(),
            queries: default_queries(),
            on_missing_structure: MissingStructurePolicy::default(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// Values given on the command line; `None` keeps the layered value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_url: Option<String>,
    pub rates_path: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub table_name: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl EtlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults, then the optional config file, then `BANKS_*` environment
    /// variables, then command line overrides. The result is validated.
    pub fn load(config_file: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("BANKS_SOURCE_URL") {
            self.source_url = v;
        }
        if let Some(v) = non_empty("BANKS_RATES_PATH") {
            self.rates_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("BANKS_CSV_PATH") {
            self.csv_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("BANKS_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("BANKS_TABLE_NAME") {
            self.table_name = v;
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(v) = overrides.source_url {
            self.source_url = v;
        }
        if let Some(v) = overrides.rates_path {
            self.rates_path = v;
        }
        if let Some(v) = overrides.csv_path {
            self.csv_path = v;
        }
        if let Some(v) = overrides.db_path {
            self.db_path = v;
        }
        if let Some(v) = overrides.table_name {
            self.table_name = v;
        }
        if let Some(v) = overrides.log_dir {
            self.log_dir = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.currencies.is_empty() {
            return Err(EtlError::Configuration(
                "at least one report currency is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for currency in &self.currencies {
            let code = currency.trim().to_ascii_uppercase();
            if !CURRENCY_CODE.is_match(&code) {
                return Err(EtlError::Configuration(format!(
                    "currency '{}' is not a three-letter code",
                    currency
                )));
            }
            if code == "USD" {
                return Err(EtlError::Configuration(
                    "USD is the source currency and is always reported".into(),
                ));
            }
            if !seen.insert(code) {
                return Err(EtlError::Configuration(format!(
                    "currency '{}' listed more than once",
                    currency
                )));
            }
        }
        if !is_sql_identifier(&self.table_name) {
            return Err(EtlError::Configuration(format!(
                "table name '{}' is not a plain SQL identifier",
                self.table_name
            )));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(EtlError::Configuration(
                "fetch.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(EtlError::Configuration(
                "fetch.max_attempts must be at least 1".into(),
            ));
        }
        if self.name_column == self.value_column {
            return Err(EtlError::Configuration(
                "name_column and value_column must differ".into(),
            ));
        }
        Ok(())
    }

    /// Report currencies, upper-cased, in configured order.
    pub fn currency_codes(&self) -> Vec<String> {
        self.currencies
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .collect()
    }

    pub fn locator(&self) -> TableLocator {
        TableLocator {
            section_anchor: self.section_anchor.clone(),
            table_selector: self.table_selector.clone(),
            name_column: self.name_column,
            value_column: self.value_column,
        }
    }

    /// Report queries with the table token replaced by the configured table name.
    pub fn resolved_queries(&self) -> Vec<String> {
        self.queries
            .iter()
            .map(|q| q.replace(TABLE_TOKEN, &self.table_name))
            .collect()
    }

    /// Lock file guarding the database against overlapping runs.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.db_path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }
}

pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}
