//! Error types for the package file-conflict detector.
//!
//! Per spec §7, [`find_file_conflicts`](crate::find_file_conflicts) itself
//! never fails: every soft failure (an unreadable package, a failed `stat`,
//! a cyclic symlink) degrades to "no conflict found for this input" plus a
//! debug line. [`IteratorError`] exists only at the [`FileIterator`]
//! boundary — the driver always downgrades it to "treat package as empty"
//! before it could ever reach a caller.
//!
//! [`FileIterator`]: crate::filelist::FileIterator

use std::fmt;

// ---------------------------------------------------------------------------
// IteratorError
// ---------------------------------------------------------------------------

/// An error a [`FileIterator`](crate::filelist::FileIterator) implementation
/// may report while visiting a single package's file list.
///
/// The driver never propagates this: every variant is caught at the pass
/// level and treated as "this package contributed nothing", matching the
/// corrupt-filelist and missing-header taxonomy in spec §7.
#[derive(Debug)]
pub enum IteratorError {
    /// The package handle could not be obtained (header unreadable, db
    /// entry missing, etc). Mirrors `handle_of(id) -> None` in spec §4.3.
    HandleUnavailable,

    /// The file list was truncated or internally inconsistent — e.g. a
    /// basename count that does not match the directory-index count.
    CorruptFileList {
        /// Human-readable detail, surfaced only in debug logging.
        detail: String,
    },

    /// An I/O error occurred while consulting package metadata (not the
    /// filesystem walks done by the directory normalizer, which have their
    /// own silent-fallback policy per spec §4.6).
    Io(std::io::Error),
}

impl fmt::Display for IteratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandleUnavailable => write!(f, "package handle unavailable"),
            Self::CorruptFileList { detail } => write!(f, "corrupt file list: {detail}"),
            Self::Io(err) => write!(f, "I/O error reading package metadata: {err}"),
        }
    }
}

impl std::error::Error for IteratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::HandleUnavailable | Self::CorruptFileList { .. } => None,
        }
    }
}

impl From<std::io::Error> for IteratorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// ---------------------------------------------------------------------------
// ConfigError re-export
// ---------------------------------------------------------------------------

pub use crate::config::ConfigError;
