//! Locus: object-store-native variant filtering and faceting engine.

pub mod config;
pub mod error;
pub mod export;
pub mod facet;
pub mod fields;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod project;
pub mod query;
pub mod server;
pub mod startup;
pub mod storage;
pub mod types;
