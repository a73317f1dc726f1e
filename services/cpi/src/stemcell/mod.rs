//! Stemcell storage.
//!
//! Stemcells are unpacked root filesystem images. Each one lives in its
//! own directory under the store root, named by a freshly generated id:
//!
//! ```text
//! <stemcells_dir>/
//! ├── 6f1ad5ae-93b2-4c7e-8f52-bb0c9bd6c1a2/   (unpacked image)
//! └── 0b8c3f1e-7d2a-4f55-9a61-2f4e8d1c7b90/
//! ```
//!
//! Directories are write-once: created and populated by
//! [`StemcellStore::import_from_path`], removed by
//! [`StemcellStore::delete`], never modified in between.

mod store;

pub use store::{Stemcell, StemcellError, StemcellStore};
