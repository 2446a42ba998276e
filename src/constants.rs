/// Defaults for a report run. Every value here can be overridden through
/// the config file, the environment or the command line.

// Source page
pub const DEFAULT_SOURCE_URL: &str =
    "https://web.archive.org/web/20230908091635/https://en.wikipedia.org/wiki/List_of_largest_banks";
pub const DEFAULT_SECTION_ANCHOR: &str = "By_market_capitalization";
pub const DEFAULT_TABLE_SELECTOR: &str = "table.wikitable";
pub const DEFAULT_NAME_COLUMN: usize = 0;
pub const DEFAULT_VALUE_COLUMN: usize = 2;

// Inputs and outputs
pub const DEFAULT_RATES_PATH: &str = "exchange_rate.csv";
pub const DEFAULT_CSV_PATH: &str = "./Largest_banks_data.csv";
pub const DEFAULT_DB_PATH: &str = "Banks.db";
pub const DEFAULT_TABLE_NAME: &str = "Largest_banks";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CURRENCIES: [&str; 3] = ["GBP", "EUR", "INR"];

// Fetching
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;
pub const USER_AGENT: &str = concat!("largest_banks/", env!("CARGO_PKG_VERSION"));

// Report schema
pub const NAME_HEADER: &str = "Name";
pub const USD_HEADER: &str = "MC_USD_Billion";

/// Placeholders the source table uses for a missing figure. The second entry is
/// the em-dash after a UTF-8 page has been decoded as Windows-1252.
pub const MISSING_VALUE_MARKERS: [&str; 2] = ["\u{2014}", "\u{e2}\u{20ac}\u{201d}"];

/// Token replaced by the configured table name inside report queries.
pub const TABLE_TOKEN: &str = "{table}";

pub fn default_queries() -> Vec<String> {
    vec![
        "SELECT * FROM {table}".to_string(),
        "SELECT AVG(MC_USD_Billion) FROM {table}".to_string(),
        "SELECT Name FROM {table} LIMIT 5".to_string(),
    ]
}

/// Column header for a market cap converted into `currency`.
pub fn currency_header(currency: &str) -> String {
    format!("MC_{}_Billion", currency)
}
