//! Tank ingestion client
//!
//! Typed HTTP client for the upstream API that accepts tank measurement and
//! transfer packages. [`IngestClient`] implements
//! [`UploadClient`](tank_core::UploadClient), so the uplink pipeline can
//! drive it directly.
//!
//! # Example
//!
//! ```rust,no_run
//! use tank_client::IngestClient;
//! use tank_core::{MeasurementRecord, UploadPackage};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = IngestClient::with_bearer_token("https://ingest.example.com", "secret")?;
//!
//! let package = UploadPackage::new(42, vec![MeasurementRecord::new(1, None)])?;
//! let result = client.send_tank_indicators(&package).await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! The `testing` module runs a fake ingestion server on a local port:
//!
//! ```rust,ignore
//! use tank_client::testing::{FakeIngest, TestServer};
//!
//! let ingest = FakeIngest::new();
//! let server = TestServer::start(ingest.router()).await?;
//! server.client.send_tank_indicators(&package).await?;
//! assert_eq!(ingest.indicators().len(), 1);
//! ```

mod client;
mod config;
mod error;
pub mod testing;
mod types;

pub use client::IngestClient;
pub use config::ApiConfig;
pub use error::{ClientError, Result};
pub use types::*;
