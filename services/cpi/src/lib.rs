//! BOSH Cloud Provider Interface for Garden/Warden containers.
//!
//! Each process invocation answers exactly one CPI request:
//!
//! 1. read a JSON request from stdin ([`rpc`])
//! 2. resolve and decode the action ([`dispatch`])
//! 3. run it against the stemcell and disk stores and the container
//!    backend ([`actions`], [`stemcell`], [`disk`], [`backend`])
//! 4. write a JSON response to stdout
//!
//! Failures inside an action are reported in the response, not through
//! the exit code.

pub mod actions;
pub mod backend;
pub mod config;
pub mod disk;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod stemcell;
pub mod system;

mod store_path;

/// CPI version (semver).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
