//! tank-uplink - Delivery pipeline for decoded tank records
//!
//! Records arrive from the polling session every tick. Each record kind has
//! its own accumulator; once it holds enough records they are formed into an
//! [`UploadPackage`](tank_core::UploadPackage), written to local storage and
//! handed to the upload client. Failed uploads are retried after a fixed
//! backoff and dead-lettered when attempts run out.
//!
//! ```text
//! tick ──► measurements ──► RecordBatch ──► package ──► store ──► upload ──► delete
//!      └─► transfers    ──► RecordBatch ──► package ──► store ──► upload ──► delete
//!                                                         │        │ fail
//!                                                         │        ▼
//!                                                         │      backoff, retry
//!                                                         │        │ exhausted
//!                                                         └──────► Error_ file
//! ```

pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod store;

pub use batch::RecordBatch;
pub use config::UplinkConfig;
pub use delivery::{DeliveryOutcome, DeliverySummary};
pub use error::{StoreError, StoreResult};
pub use pipeline::BatchPipeline;
pub use retry::RetryState;
pub use store::PackageStore;
