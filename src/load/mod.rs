pub mod csv_file;
pub mod database;
pub mod lock;

pub use csv_file::{persist_to_file, read_report_file};
pub use database::ReportDatabase;
pub use lock::RunLock;
