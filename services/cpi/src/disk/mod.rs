//! Persistent disk storage.
//!
//! Persistent disks are plain host directories, bind mounted into a VM
//! while attached. Each disk directory has a sidecar metadata file:
//!
//! ```text
//! <disks_dir>/
//! ├── 3c9e1c84-....            (disk contents)
//! └── 3c9e1c84-....json        ({"id": ..., "size_mb": ...})
//! ```

mod store;

pub use store::{Disk, DiskError, DiskMeta, DiskStore};
