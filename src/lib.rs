//! `pkgconflict` — the package file-conflict detector.
//!
//! Given an ordered set of package transactions (newly-installed packages
//! plus already-installed packages), finds every pair that would write
//! different content to the same absolute path, running in bounded memory
//! regardless of how many files each package carries.
//!
//! The entry point is [`find_file_conflicts`]; callers supply a
//! [`FileIterator`] implementation that knows how to list a package's
//! files — this crate never reads an RPM, DEB, or solv file itself.

pub mod config;
pub mod driver;
pub mod error;
pub mod filelist;
pub mod filespace;
pub mod hash;
pub mod model;
pub mod normalize;
pub mod passes;

pub use config::{BudgetConfig, ConfigError, DetectFlags, DetectorConfig};
pub use driver::find_file_conflicts;
pub use filelist::{FileIterator, IterFlags};
pub use model::{Candidate, CandidateKind, Color, Conflict, FileEntry, FileMode, PackageIndex, SlotValue};
pub use normalize::{DirId, DirNormalizer};

/// Install a [`tracing_subscriber`] formatter driven by `RUST_LOG`
/// (default `info`), matching the ambient logging setup callers of this
/// crate's own tests and binaries use. Library consumers are free to set
/// up their own subscriber instead; this is a convenience, not a
/// requirement — `find_file_conflicts` emits `tracing` events regardless
/// of whether a subscriber is installed.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
