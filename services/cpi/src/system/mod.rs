//! Host-side collaborators: filesystem access, archive handling and
//! command execution.
//!
//! All are traits so stores and backends can be exercised against failing
//! or instrumented implementations in tests.

mod command;
mod compressor;
mod fs;

pub use command::{CommandError, CommandRunner, ExecCommandRunner};
pub use compressor::{Compressor, CompressorError, CompressorOptions, TarballCompressor};
pub use fs::{FileSystem, OsFileSystem};
