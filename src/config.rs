//! Detector configuration (`pkgconflict.toml`).
//!
//! Defines the typed configuration for tuning the file-conflict detector's
//! hash-table growth ratios and behavioral flags. None of these fields
//! change *what* conflicts are found — only how much scratch memory the
//! detector pre-allocates before it starts growing tables on demand.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level detector configuration.
///
/// Parsed from a `pkgconflict.toml` file, or built directly with
/// [`DetectorConfig::default`]. Missing fields use sensible defaults.
/// Missing file → all defaults (no error).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// Resource-budget tunables for the growable hash tables.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Behavioral flags for the detection run.
    #[serde(default)]
    pub flags: DetectFlags,

    /// Alternate root directory for canon-mode normalization, consulted
    /// only when `flags.check_dir_aliasing` and `flags.use_root_dir` are
    /// both set. `None` means the real filesystem root.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            flags: DetectFlags::default(),
            root_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// BudgetConfig
// ---------------------------------------------------------------------------

/// Resource budget guidance (spec §5), expressed as multipliers against
/// the size of the candidate prefix (`cutoff`) or the candidate count.
///
/// These are starting sizes only: every table in this crate grows
/// unconditionally via [`crate::hash::GrowableHashMap`] once load exceeds
/// 50%, so an undersized budget costs a rehash, never a wrong answer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Directory map: initial slots per candidate package (default: 16).
    #[serde(default = "default_dir_map_ratio")]
    pub dir_map_ratio: u32,

    /// File map: initial slots per candidate package (default: 32).
    #[serde(default = "default_file_map_ratio")]
    pub file_map_ratio: u32,

    /// Fetch index: initial slots per candidate tuple (default: 4), with a
    /// 4095-slot floor (spec §5).
    #[serde(default = "default_fetch_map_ratio")]
    pub fetch_map_ratio: u32,

    /// Directory-normalizer map: initial slots per candidate package
    /// (default: 4).
    #[serde(default = "default_normap_ratio")]
    pub normap_ratio: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            dir_map_ratio: default_dir_map_ratio(),
            file_map_ratio: default_file_map_ratio(),
            fetch_map_ratio: default_fetch_map_ratio(),
            normap_ratio: default_normap_ratio(),
        }
    }
}

const fn default_dir_map_ratio() -> u32 {
    16
}

const fn default_file_map_ratio() -> u32 {
    32
}

const fn default_fetch_map_ratio() -> u32 {
    4
}

const fn default_normap_ratio() -> u32 {
    4
}

// ---------------------------------------------------------------------------
// DetectFlags
// ---------------------------------------------------------------------------

/// Behavioral flags recognized by [`crate::find_file_conflicts`] (spec §6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectFlags {
    /// Use the metadata filelist as a shortcut for already-installed
    /// packages when available, skipping a full header re-read unless a
    /// cheap precheck finds a possible hit.
    #[serde(default)]
    pub use_filelist_index: bool,

    /// Resolve directory aliases (symlinked directories) via normalization
    /// before comparing paths.
    #[serde(default)]
    pub check_dir_aliasing: bool,

    /// Perform canon-mode normalization relative to a configured alternate
    /// root, instead of stat-mode `(inode, device)` unification. Only
    /// meaningful when `check_dir_aliasing` is set.
    #[serde(default)]
    pub use_root_dir: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a detector configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl DetectorConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
