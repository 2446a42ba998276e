use anyhow::Result;
use largest_banks::config::{EtlConfig, MissingStructurePolicy};
use largest_banks::error::EtlError;
use largest_banks::extract::{ExtractOutcome, StaticDocument};
use largest_banks::load::{read_report_file, ReportDatabase, RunLock};
use largest_banks::pipeline::Pipeline;
use largest_banks::types::QueryValue;
use std::path::Path;
use tempfile::tempdir;

fn page(rows: &[(&str, &str)]) -> String {
    let body: String = rows
        .iter()
        .enumerate()
        .map(|(i, (name, cap))| format!("<tr><td>{}</td><td>{}</td><td>{}\n</td></tr>\n", name, i + 1, cap))
        .collect();
    format!(
        r#"<!DOCTYPE html><html><body>
        <h2><span class="mw-headline" id="By_market_capitalization">By market capitalization</span></h2>
        <table class="wikitable sortable mw-collapsible">
          <tbody>
            <tr><th>Bank name</th><th>Rank</th><th>Market cap<br>(US$ billion)</th></tr>
            {}
          </tbody>
        </table>
        </body></html>"#,
        body
    )
}

fn config_in(dir: &Path, rates: &str) -> EtlConfig {
    let rates_path = dir.join("exchange_rate.csv");
    std::fs::write(&rates_path, rates).unwrap();
    EtlConfig {
        rates_path,
        csv_path: dir.join("out").join("Largest_banks_data.csv"),
        db_path: dir.join("Banks.db"),
        log_dir: dir.join("logs"),
        ..EtlConfig::default()
    }
}

const RATES: &str = "Currency,Rate\nEUR,0.93\nGBP,0.8\nINR,82.0\n";

#[tokio::test]
async fn test_single_bank_is_converted_and_persisted() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let source = StaticDocument::new("memory://banks", page(&[("Bank X", "100.0")]));

    let summary = Pipeline::new(config.clone()).run(&source).await?;
    assert!(summary.loaded);
    assert_eq!(summary.report_rows, 1);

    let from_file = read_report_file(&config.csv_path)?;
    assert_eq!(from_file.currencies, vec!["GBP", "EUR", "INR"]);
    assert_eq!(from_file.records[0].name, "Bank X");
    assert_eq!(from_file.records[0].market_cap_usd, 100.0);
    assert_eq!(from_file.records[0].converted, vec![80.0, 93.0, 8200.0]);

    let all = &summary.queries[0];
    assert_eq!(
        all.rows,
        vec![vec![
            QueryValue::Text("Bank X".into()),
            QueryValue::Real(100.0),
            QueryValue::Real(80.0),
            QueryValue::Real(93.0),
            QueryValue::Real(8200.0),
        ]]
    );
    assert_eq!(summary.queries[1].rows, vec![vec![QueryValue::Real(100.0)]]);
    assert!(!config.lock_path().exists());
    Ok(())
}

#[tokio::test]
async fn test_marker_and_unparsable_rows_are_excluded() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let rows = [
        ("Alpha", "300.5"),
        ("Missing", "\u{2014}"),
        ("Garbled", "\u{e2}\u{20ac}\u{201d}"),
        ("Beta", "250"),
        ("Broken", "twelve"),
        ("Gamma", "199.99"),
    ];
    let source = StaticDocument::new("memory://banks", page(&rows));

    let summary = Pipeline::new(config.clone()).run(&source).await?;
    assert_eq!(summary.report_rows, rows.len() - 2 - 1);
    assert_eq!(
        summary.outcome,
        ExtractOutcome::Table { rows_seen: 6, rows_skipped: 3, parse_failures: 1 }
    );

    let db = ReportDatabase::open(&config.db_path)?;
    let names = db.run_query("SELECT Name FROM Largest_banks")?;
    let names: Vec<String> = names.rows.iter().map(|r| r[0].to_string()).collect();
    assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    db.close()?;
    Ok(())
}

#[tokio::test]
async fn test_first_five_follow_source_order() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let rows: Vec<(String, String)> = (0..10)
        .map(|i| (format!("Bank {:02}", 10 - i), format!("{}.5", 500 - i * 17)))
        .collect();
    let borrowed: Vec<(&str, &str)> = rows.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
    let source = StaticDocument::new("memory://banks", page(&borrowed));

    let summary = Pipeline::new(config).run(&source).await?;
    assert_eq!(summary.report_rows, 10);
    let top: Vec<String> = summary.queries[2].rows.iter().map(|r| r[0].to_string()).collect();
    assert_eq!(top, vec!["Bank 10", "Bank 09", "Bank 08", "Bank 07", "Bank 06"]);
    Ok(())
}

#[tokio::test]
async fn test_rerun_replaces_previous_report() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let first = StaticDocument::new("memory://q1", page(&[("Old A", "1"), ("Old B", "2")]));
    let second = StaticDocument::new("memory://q2", page(&[("New A", "3")]));

    Pipeline::new(config.clone()).run(&first).await?;
    let summary = Pipeline::new(config.clone()).run(&second).await?;

    let names: Vec<String> = summary.queries[0].rows.iter().map(|r| r[0].to_string()).collect();
    assert_eq!(names, vec!["New A"]);
    assert_eq!(read_report_file(&config.csv_path)?.records.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_structure_keeps_previous_outputs() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let good = StaticDocument::new("memory://good", page(&[("Kept", "42")]));
    let moved = StaticDocument::new("memory://moved", "<html><body><h2>Renamed</h2></body></html>");

    Pipeline::new(config.clone()).run(&good).await?;
    let summary = Pipeline::new(config.clone()).run(&moved).await?;
    assert!(!summary.loaded);
    assert!(summary.queries.is_empty());
    assert!(matches!(summary.outcome, ExtractOutcome::StructureNotFound { .. }));

    let kept = read_report_file(&config.csv_path)?;
    assert_eq!(kept.records[0].name, "Kept");
    Ok(())
}

#[tokio::test]
async fn test_write_empty_policy_persists_empty_report() -> Result<()> {
    let dir = tempdir()?;
    let mut config = config_in(dir.path(), RATES);
    config.on_missing_structure = MissingStructurePolicy::WriteEmpty;
    let good = StaticDocument::new("memory://good", page(&[("Gone", "42")]));
    let moved = StaticDocument::new("memory://moved", "<html><body></body></html>");

    Pipeline::new(config.clone()).run(&good).await?;
    let summary = Pipeline::new(config.clone()).run(&moved).await?;
    assert!(summary.loaded);
    assert!(summary.queries[0].rows.is_empty());
    assert!(read_report_file(&config.csv_path)?.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_rate_aborts_before_writing() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), "Currency,Rate\nGBP,0.8\nEUR,0.93\n");
    let source = StaticDocument::new("memory://banks", page(&[("Bank X", "100")]));

    let err = Pipeline::new(config.clone()).run(&source).await.unwrap_err();
    assert!(matches!(err, EtlError::Configuration(ref m) if m.contains("INR")));
    assert!(err.is_fatal());
    assert!(!config.csv_path.exists());
    assert!(!config.db_path.exists());
    assert!(!config.lock_path().exists());
    Ok(())
}

#[tokio::test]
async fn test_overlapping_run_is_refused() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let _held = RunLock::acquire(config.lock_path())?;
    let source = StaticDocument::new("memory://banks", page(&[("Bank X", "100")]));

    let err = Pipeline::new(config.clone()).run(&source).await.unwrap_err();
    assert!(matches!(err, EtlError::RunLocked(_)));
    assert!(!config.csv_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_lock_left_by_killed_run_does_not_block() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let mut child = std::process::Command::new("true").spawn()?;
    let dead_pid = child.id();
    child.wait()?;
    std::fs::write(config.lock_path(), format!("pid={}\n", dead_pid))?;
    let source = StaticDocument::new("memory://banks", page(&[("Bank X", "100")]));

    let summary = Pipeline::new(config.clone()).run(&source).await?;
    assert!(summary.loaded);
    assert!(!config.lock_path().exists());
    Ok(())
}

#[tokio::test]
async fn test_database_failure_keeps_previous_csv() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), RATES);
    let good = StaticDocument::new("memory://good", page(&[("Kept", "42")]));
    Pipeline::new(config.clone()).run(&good).await?;

    let mut broken = config.clone();
    broken.db_path = dir.path().join("db_is_a_directory");
    std::fs::create_dir(&broken.db_path)?;
    let next = StaticDocument::new("memory://next", page(&[("Replaced", "7")]));

    let err = Pipeline::new(broken).run(&next).await.unwrap_err();
    assert!(matches!(err, EtlError::Storage(_)));
    assert!(err.is_fatal());
    let kept = read_report_file(&config.csv_path)?;
    assert_eq!(kept.records.len(), 1);
    assert_eq!(kept.records[0].name, "Kept");
    Ok(())
}
