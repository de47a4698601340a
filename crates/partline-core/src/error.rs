//! Error Types for the partline data model
//!
//! These errors are raised while building model values, before any transport
//! is involved. The client crate converts them into its own error type via
//! `#[from]`.
//!
//! ## Error Categories
//!
//! ### Validation Errors
//! - `InvalidDelayLevel`: delay levels must be strictly positive
//!
//! ### Batch Errors
//! - `EmptyBatch`: a consumption batch always holds at least one message
//! - `MixedPartitions`: a consumption batch never spans two partitions

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid delay level {0}: levels start at 1")]
    InvalidDelayLevel(i32),

    #[error("Consumption batch must contain at least one message")]
    EmptyBatch,

    #[error("Consumption batch mixes partitions {first} and {other}")]
    MixedPartitions { first: String, other: String },
}

pub type Result<T> = std::result::Result<T, Error>;
