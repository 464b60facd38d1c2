//! Tribune - relationship-based access control for a Model UN conference platform.
//!
//! Exposes all modules for the binary and the integration tests.

pub mod authz;
pub mod errors;
pub mod settings;
pub mod storage;
pub mod subject;
pub mod web;
