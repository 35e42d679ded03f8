//! Read files inside zip archives through ordinary filesystem paths.
//!
//! A path such as `/app/data.zip/templates/index.html` names the entry
//! `templates/index.html` of the archive `/app/data.zip`, provided that
//! archive has been registered with an [`ArchiveRegistry`]. [`ZipAccess`]
//! answers `exists`, `is_file` and `open` for such paths and passes every
//! other path through to the real filesystem.
//!
//! ```no_run
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! use zipaccess::{AccessOptions, ArchiveRegistry, OpenMode, OpenOptions, ZipAccess};
//!
//! # fn main() -> zipaccess::Result<()> {
//! let registry = Arc::new(ArchiveRegistry::new(AccessOptions::default()));
//! let access = ZipAccess::new(registry);
//! access.register_archive("/app/data.zip")?;
//!
//! let mut page = String::new();
//! access
//!     .open("/app/data.zip/templates/index.html", OpenMode::READ, &OpenOptions::default())?
//!     .read_to_string(&mut page)?;
//! # Ok(())
//! # }
//! ```

mod access;
pub mod container;
mod error;
mod fs;
mod options;
pub mod path;
mod registry;
mod resolve;
mod stream;

pub use access::ZipAccess;
pub use container::{Container, ContainerOpener, OpenError, ZipContainer, ZipOpener};
pub use error::{Error, Result};
pub use fs::{Filesystem, OpenOptions, StdFilesystem};
pub use options::{AccessOptions, Logger};
pub use registry::{ArchiveAccess, ArchiveRef, ArchiveRegistry, ArchiveState, Refusal};
pub use resolve::{EntryResolver, ResolvedEntry};
pub use stream::{
    Access, EntryRead, EntryStream, FileIo, OpenMode, ReadOnlyBuffer, Stream, StreamFactory,
};
