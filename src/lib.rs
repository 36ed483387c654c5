pub mod config;
pub mod endpoints;
pub mod error;
pub mod export;
pub mod features;
pub mod fetcher;
pub mod http_cache;
pub mod http_client;
pub mod ingest;
pub mod linalg;
pub mod moneyball;
pub mod parquet_io;
pub mod pca;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod run_ledger;
pub mod salaries;
pub mod scaler;
pub mod schedule;
pub mod seasons;
pub mod similarity;
pub mod stats;
pub mod table;
pub mod vae;
