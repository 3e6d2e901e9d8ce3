//! # dcmsort Common Library
//!
//! Shared code for the dcmsort2nii conversion pipeline:
//! - Common error type
//! - TOML configuration loading, resolution and write-back

pub mod config;
pub mod error;

pub use error::{Error, Result};
