//! Record and package models

mod measurement;
mod package;
mod transfer;

pub use measurement::*;
pub use package::*;
pub use transfer::*;
