//! # warden-cpi-id
//!
//! Opaque handle types and identifier generation for the warden CPI.
//!
//! ## Design Principles
//!
//! - Handles are system-generated; the orchestrator only ever echoes them back
//! - Handles are passed through unchanged and never interpreted
//! - Handles are typed to prevent mixing stemcells, VMs and disks
//! - Generation goes through the [`IdGenerator`] capability so callers can
//!   inject deterministic or failing generators
//!
//! ## Handle Format
//!
//! Freshly generated handles are lowercase hyphenated UUIDv4 strings:
//!
//! - `6f1ad5ae-93b2-4c7e-8f52-bb0c9bd6c1a2`
//!
//! Handles received from the orchestrator are accepted verbatim. Whether a
//! received handle names anything is decided by the component that owns it.

mod error;
mod generator;
mod macros;
mod types;

pub use error::IdError;
pub use generator::{IdGenerator, UuidGenerator};
pub use types::*;
