//! The file-iterator capability (spec §4.3): the external contract through
//! which the detector learns a package's directories and files, without
//! ever caring whether that package came from an installed-package
//! database, a downloaded package file, or an in-memory header.

use crate::error::IteratorError;
use crate::model::FileEntry;

/// Flags a pass may request of [`FileIterator::iterate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterFlags {
    /// Yield directory entries only (pass 1).
    pub only_directories: bool,
    /// Include content digests (pass 3 expansion).
    pub with_digest: bool,
    /// Include file colors (pass 3 expansion, when file-color mode is on).
    pub with_color: bool,
    /// Suppress configuration-ghost entries (passes 2 onward).
    pub no_ghosts: bool,
}

impl IterFlags {
    /// Flags for pass 1: directories only, no digest/color needed.
    #[must_use]
    pub const fn directories_only() -> Self {
        Self {
            only_directories: true,
            with_digest: false,
            with_color: false,
            no_ghosts: false,
        }
    }

    /// Flags for pass 2 (non-alias and alias basename scans): full entries,
    /// basenames only, no digest needed yet.
    #[must_use]
    pub const fn basenames_only() -> Self {
        Self {
            only_directories: false,
            with_digest: false,
            with_color: false,
            no_ghosts: true,
        }
    }

    /// Flags for pass 3 expansion: basenames plus digests (and colors, when
    /// requested by the caller).
    #[must_use]
    pub const fn with_digests(with_color: bool) -> Self {
        Self {
            only_directories: false,
            with_digest: true,
            with_color,
            no_ghosts: true,
        }
    }
}

/// The external capability that yields a package's file entries.
///
/// `P` is the caller's own package identifier type (opaque to the
/// detector); `H` is the caller's package handle type, borrowed for the
/// duration of a single `iterate` call and never retained across passes.
pub trait FileIterator<P, H> {
    /// Resolve a package id to a handle, or `None` if the package's
    /// metadata could not be obtained (spec §4.3: "allows the driver to be
    /// oblivious to how packages are stored").
    fn handle_for(&self, id: &P) -> Option<H>;

    /// Visit every file entry for `handle` matching `flags`, in any order,
    /// calling `visit` once per entry.
    ///
    /// # Errors
    /// Returns [`IteratorError`] when the file list is corrupt or
    /// unreadable. The driver always downgrades this to "package
    /// contributed nothing" — see spec §7.
    fn iterate(
        &self,
        handle: &H,
        flags: IterFlags,
        visit: &mut dyn FnMut(&FileEntry),
    ) -> Result<(), IteratorError>;
}
