// forch-api: Faucet event socket ingestion and varz scraping

pub mod error;
pub mod event;
pub mod ingest;
pub mod varz;

pub use error::Error;
pub use event::{EventKind, FaucetEvent};
pub use ingest::{EventIngestor, IngestConfig};
pub use varz::{MetricSnapshot, Sample, VarzClient};
