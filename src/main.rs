use clap::Parser;
use largest_banks::config::{ConfigOverrides, EtlConfig};
use largest_banks::error::EtlError;
use largest_banks::extract::HttpDocumentSource;
use largest_banks::logging;
use largest_banks::pipeline::{Pipeline, RunSummary};
use largest_banks::report;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "largest_banks")]
#[command(about = "Extract, convert and load the largest banks by market capitalization")]
#[command(version)]
struct Cli {
    /// TOML file with settings; flags below take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source page URL
    #[arg(long)]
    url: Option<String>,

    /// Exchange rate CSV (Currency,Rate)
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Output CSV path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Database table name
    #[arg(long)]
    table: Option<String>,

    /// Directory for the JSON progress log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print query results as JSON instead of text tables
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source_url: self.url.clone(),
            rates_path: self.rates.clone(),
            csv_path: self.csv.clone(),
            db_path: self.db.clone(),
            table_name: self.table.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

async fn run(config: EtlConfig) -> anyhow::Result<RunSummary> {
    let source = HttpDocumentSource::new(config.source_url.clone(), config.fetch.clone())?;
    let pipeline = Pipeline::new(config);
    Ok(pipeline.run(&source).await?)
}

fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", report::render_summary(summary));
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let config = match EtlConfig::load(cli.config.as_deref(), cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init_logging(&config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("🚀 Starting largest banks report");

    let result = match run(config).await {
        Ok(summary) => print_summary(&summary, cli.json),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("✅ Report run finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let fatal = e
                .downcast_ref::<EtlError>()
                .map(EtlError::is_fatal)
                .unwrap_or(true);
            error!("Report run failed: {:#}", e);
            eprintln!("❌ Report run failed: {:#}", e);
            if fatal {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}
