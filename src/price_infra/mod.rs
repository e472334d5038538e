pub mod aggregator;
pub mod cache;
pub mod connectors;
pub mod ingest;
