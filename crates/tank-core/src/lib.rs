//! tank-core - Core record types and upload contract for the tank gauge agent
//!
//! This crate holds the types shared between the device side (which decodes
//! gauge replies into records) and the uplink side (which batches records into
//! packages and hands them to an [`UploadClient`]).

pub mod error;
pub mod models;
pub mod precision;
pub mod upload;

pub use error::{CoreError, CoreResult};
pub use models::*;
pub use upload::{UploadClient, UploadOutcome};
