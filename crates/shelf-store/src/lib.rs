//! # shelf-store
//!
//! Crash-consistent named value store over memory-mapped segments.
//!
//! Every value lives in its own segment: a durable byte region addressed by
//! name, starting with a fixed-size header that carries a type tag and a
//! payload checksum. Values are replaced in place through an atomic update
//! protocol (write new segment under `<name>-tmp`, commit, swap names,
//! reclaim old), so a crash at any point leaves `<name>` holding either the
//! whole old value or the whole new one.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── .lock                      # exclusive while a Directory is open
//! ├── swap.journal               # only during a journaled swap
//! ├── swap.aside                 # only during a journaled swap
//! └── segments/
//!     └── 636f756e746572.seg     # hex(name).seg = header + payload
//! ```
//!
//! ## Layers
//!
//! - [`Directory`]: name → segment mapping (create/open_segment/erase/atomic_swap)
//! - [`header`]: 32-byte segment header, type tag validation
//! - [`Shadow`] / [`Shelved`]: unmaterialized description and live proxy
//! - [`update`]: the atomic update protocol
//! - [`Shelf`]: dynamic facade keyed by name

mod directory;
pub mod header;
pub mod recovery;
mod segment;
mod shadow;
mod shelf;
mod shelved;
pub mod swap;
pub mod update;
pub mod value;

pub use directory::{validate_name, Directory, StoreOptions, StoreStats, TEMP_SUFFIX};
pub use header::{Header, TypeTag, HEADER_SIZE};
pub use recovery::SweepReport;
pub use segment::{PendingSegment, Segment};
pub use shadow::Shadow;
pub use shelf::Shelf;
pub use shelved::Shelved;
pub use swap::SwapMode;
pub use update::UpdateStep;
pub use value::{NdArray, Shelvable, Value};

use std::io;

use thiserror::Error;

/// Why a segment header could not be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFault {
    /// Segment shorter than the header, or than the length it declares
    Truncated,
    /// Magic is all zero: the segment was created but never committed
    Uncommitted,
    /// Magic present but not ours
    BadMagic,
    /// Format version this build does not understand
    UnsupportedVersion(u16),
    /// Type tag outside the known enumeration
    UnknownTag(u16),
}

impl std::fmt::Display for HeaderFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderFault::Truncated => write!(f, "truncated segment"),
            HeaderFault::Uncommitted => write!(f, "uncommitted segment"),
            HeaderFault::BadMagic => write!(f, "bad magic"),
            HeaderFault::UnsupportedVersion(v) => write!(f, "unsupported version {}", v),
            HeaderFault::UnknownTag(t) => write!(f, "unknown type tag {}", t),
        }
    }
}

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Segment not found: {name}")]
    NotFound { name: String },

    #[error("Segment already exists: {name}")]
    NameExists { name: String },

    #[error("Out of space: requested {requested} bytes, {available} available")]
    OutOfSpace { requested: u64, available: u64 },

    #[error("Corrupt header in {name}: {reason}")]
    CorruptHeader { name: String, reason: HeaderFault },

    #[error("Corrupt payload in {name}: {reason}")]
    CorruptPayload { name: String, reason: String },

    #[error("Type conflict on {name}: expected {expected}, found {found}")]
    TypeConflict {
        name: String,
        expected: TypeTag,
        found: TypeTag,
    },

    #[error("Update of {name} aborted: {source}")]
    UpdateAborted {
        name: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Store at {root} is locked by another handle")]
    StoreLocked { root: String },

    #[error("Swap journal error: {0}")]
    Journal(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(name: &str) -> Self {
        StoreError::NotFound {
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for errors meaning the stored bytes cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::CorruptHeader { .. } | StoreError::CorruptPayload { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
