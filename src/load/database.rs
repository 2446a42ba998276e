use crate::config::is_sql_identifier;
use crate::error::{EtlError, Result};
use crate::types::{QueryResult, QueryValue, ReportTable};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use tracing::{debug, info, instrument};

/// The report database, owned for the duration of one run.
///
/// The connection is released by `close`, or on drop if a run bails out early.
pub struct ReportDatabase {
    conn: Connection,
}

impl ReportDatabase {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        info!("Opened report database {}", db_path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Replaces `table_name` with the contents of `table` in one transaction.
    #[instrument(skip(self, table), fields(records = table.len()))]
    pub fn persist_to_database(&mut self, table: &ReportTable, table_name: &str) -> Result<()> {
        if !is_sql_identifier(table_name) {
            return Err(EtlError::Configuration(format!(
                "table name '{}' is not a plain SQL identifier",
                table_name
            )));
        }
        let headers = table.headers();
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, h)| format!("\"{}\" {}", h, if i == 0 { "TEXT" } else { "REAL" }))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=headers.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"{table}\"; CREATE TABLE \"{table}\" ({columns});",
            table = table_name,
            columns = columns
        ))?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO \"{}\" VALUES ({})",
                table_name, placeholders
            ))?;
            for record in &table.records {
                let mut values: Vec<rusqlite::types::Value> =
                    Vec::with_capacity(headers.len());
                values.push(record.name.clone().into());
                values.push(record.market_cap_usd.into());
                values.extend(record.converted.iter().map(|v| (*v).into()));
                insert.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        info!("Replaced table {} with {} rows", table_name, table.len());
        Ok(())
    }

    /// Runs a read-only statement and returns every row in result order.
    ///
    /// Statements are trusted, fixed report queries; anything that would
    /// modify the database is refused.
    #[instrument(skip(self))]
    pub fn run_query(&self, query: &str) -> Result<QueryResult> {
        let mut stmt = self.conn.prepare(query)?;
        if !stmt.readonly() {
            return Err(EtlError::Storage(format!(
                "refusing to run a statement that modifies the database: {}",
                query
            )));
        }
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(match row.get_ref(i)? {
                    ValueRef::Null => QueryValue::Null,
                    ValueRef::Integer(v) => QueryValue::Integer(v),
                    ValueRef::Real(v) => QueryValue::Real(v),
                    ValueRef::Text(t) => QueryValue::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => QueryValue::Text(format!("<{} byte blob>", b.len())),
                });
            }
            out.push(values);
        }
        debug!("Query returned {} rows", out.len());
        Ok(QueryResult {
            query: query.to_string(),
            columns,
            rows: out,
        })
    }

    /// Closes the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| EtlError::Storage(format!("failed to close database: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnrichedBankRecord;

    fn report(names: &[&str]) -> ReportTable {
        ReportTable::new(
            vec!["GBP".into(), "EUR".into()],
            names
                .iter()
                .enumerate()
                .map(|(i, n)| EnrichedBankRecord {
                    name: n.to_string(),
                    market_cap_usd: 100.0 + i as f64,
                    converted: vec![80.0 + i as f64, 93.0 + i as f64],
                })
                .collect(),
        )
    }

    fn names(result: &QueryResult) -> Vec<String> {
        result.rows.iter().map(|r| r[0].to_string()).collect()
    }

    #[test]
    fn test_persist_creates_typed_table() {
        let mut db = ReportDatabase::open_in_memory().unwrap();
        db.persist_to_database(&report(&["A", "B"]), "Largest_banks").unwrap();

        let all = db.run_query("SELECT * FROM Largest_banks").unwrap();
        assert_eq!(
            all.columns,
            vec!["Name", "MC_USD_Billion", "MC_GBP_Billion", "MC_EUR_Billion"]
        );
        assert_eq!(
            all.rows[1],
            vec![
                QueryValue::Text("B".into()),
                QueryValue::Real(101.0),
                QueryValue::Real(81.0),
                QueryValue::Real(94.0)
            ]
        );

        let avg = db.run_query("SELECT AVG(MC_USD_Billion) FROM Largest_banks").unwrap();
        assert_eq!(avg.rows, vec![vec![QueryValue::Real(100.5)]]);
    }

    #[test]
    fn test_second_persist_replaces_first() {
        let mut db = ReportDatabase::open_in_memory().unwrap();
        db.persist_to_database(&report(&["Old1", "Old2", "Old3"]), "Largest_banks").unwrap();
        db.persist_to_database(&report(&["New1"]), "Largest_banks").unwrap();

        let all = db.run_query("SELECT Name FROM Largest_banks").unwrap();
        assert_eq!(names(&all), vec!["New1"]);
    }

    #[test]
    fn test_empty_report_still_creates_table() {
        let mut db = ReportDatabase::open_in_memory().unwrap();
        db.persist_to_database(&report(&[]), "Largest_banks").unwrap();
        let count = db.run_query("SELECT COUNT(*) FROM Largest_banks").unwrap();
        assert_eq!(count.rows, vec![vec![QueryValue::Integer(0)]]);
    }

    #[test]
    fn test_first_five_in_stored_order() {
        let mut db = ReportDatabase::open_in_memory().unwrap();
        let order = ["J", "B", "I", "C", "H", "D", "G", "E", "F", "A"];
        db.persist_to_database(&report(&order), "Largest_banks").unwrap();
        let top = db.run_query("SELECT Name FROM Largest_banks LIMIT 5").unwrap();
        assert_eq!(names(&top), vec!["J", "B", "I", "C", "H"]);
    }

    #[test]
    fn test_run_query_refuses_writes() {
        let mut db = ReportDatabase::open_in_memory().unwrap();
        db.persist_to_database(&report(&["A"]), "Largest_banks").unwrap();
        let err = db.run_query("DELETE FROM Largest_banks").unwrap_err();
        assert!(matches!(err, EtlError::Storage(_)));
        assert_eq!(names(&db.run_query("SELECT Name FROM Largest_banks").unwrap()), vec!["A"]);
    }

    #[test]
    fn test_bad_query_and_table_name() {
        let mut db = ReportDatabase::open_in_memory().unwrap();
        assert!(matches!(db.run_query("SELECT * FROM missing"), Err(EtlError::Storage(_))));
        assert!(matches!(
            db.persist_to_database(&report(&["A"]), "x\"; DROP"),
            Err(EtlError::Configuration(_))
        ));
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Banks.db");
        let mut db = ReportDatabase::open(&path).unwrap();
        db.persist_to_database(&report(&["A", "B"]), "Largest_banks").unwrap();
        db.close().unwrap();

        let db = ReportDatabase::open(&path).unwrap();
        let all = db.run_query("SELECT Name FROM Largest_banks").unwrap();
        assert_eq!(names(&all), vec!["A", "B"]);
    }
}
