//! Typed handle definitions for CPI resources.
//!
//! Stemcell and disk handles are minted by this CPI. VM handles are minted
//! here too but are treated by every other component as backend-owned.

use crate::define_cid;

define_cid!(StemcellCid, "stemcell");
define_cid!(VmCid, "vm");
define_cid!(DiskCid, "disk");

// =============================================================================
// Tests
// =============================================================================
