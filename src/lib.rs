pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod rates;
pub mod report;
pub mod transform;
pub mod types;
