//! Directory-alias resolution (spec §4.6): maps a directory path string to
//! a stable normalized-directory identifier so two paths naming the same
//! on-disk directory compare equal.
//!
//! Two strategies select at construction time:
//!
//! - **stat mode** — `stat(2)` the directory and unify via `(inode,
//!   device)`, used when no alternate root is configured.
//! - **canon mode** — recursively resolve `.`/`..`/symlinks relative to a
//!   configured root, used when a chroot makes raw `stat` results
//!   meaningless.
//!
//! Every failure mode (stat fails, readlink fails, a cyclic symlink) falls
//! back to treating the directory as its own canonical form — the detector
//! tolerates the resulting spurious candidates; they are eliminated later
//! by the pass-4 comparison (spec §4.6 "Failure modes").

use std::path::{Path, PathBuf};

use same_file::is_same_file;

use crate::filespace::{Filespace, FilespaceOffset};
use crate::hash::{GrowableHashMap, nonzero_hash, strnhash};

/// A stable identifier for an on-disk directory after alias resolution.
/// Transitive (spec §3 invariant 5): two directories with the same `DirId`
/// are treated as the same directory everywhere in the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirId(pub FilespaceOffset);

#[derive(Debug, Clone, Copy)]
enum NorqEntry {
    InProgress,
    Done(DirId),
}

/// Which strategy [`DirNormalizer`] uses to unify directory aliases.
#[derive(Debug, Clone)]
enum Strategy {
    /// Unify via `(inode, device)`. No root boundary.
    Stat,
    /// Unify via symlink-following path canonicalization relative to
    /// `root`. `root` is `None` for the real filesystem root.
    Canon { root: Option<PathBuf> },
}

/// Directory-alias resolver. Lives for passes 2–4 of a detection run; see
/// spec §3 "Normalized-directory record".
pub struct DirNormalizer {
    strategy: Strategy,
    normap: GrowableHashMap,
    norq: Vec<(FilespaceOffset, NorqEntry)>,
    /// `(ino, dev)` 16-byte key -> norq index, stat mode only.
    statmap: Option<GrowableHashMap>,
    stat_keys: Vec<[u8; 16]>,
}

impl DirNormalizer {
    /// Build a stat-mode normalizer (no chroot boundary configured).
    #[must_use]
    pub fn stat_mode(capacity_hint: u32) -> Self {
        Self {
            strategy: Strategy::Stat,
            normap: GrowableHashMap::with_capacity_hint(capacity_hint),
            norq: Vec::new(),
            statmap: Some(GrowableHashMap::with_capacity_hint(capacity_hint)),
            stat_keys: Vec::new(),
        }
    }

    /// Build a canon-mode normalizer relative to `root` (the configured
    /// alternate root directory); `root = None` means the real `/`.
    #[must_use]
    pub fn canon_mode(capacity_hint: u32, root: Option<PathBuf>) -> Self {
        Self {
            strategy: Strategy::Canon { root },
            normap: GrowableHashMap::with_capacity_hint(capacity_hint),
            norq: Vec::new(),
            statmap: None,
            stat_keys: Vec::new(),
        }
    }

    /// Resolve `dir` (a directory path ending in `/`, or empty for the
    /// root) to a stable [`DirId`], materializing the result into
    /// `filespace`. Always succeeds — failures fall back to treating `dir`
    /// as its own canonical form.
    pub fn normalize(&mut self, filespace: &mut Filespace, dir: &str) -> DirId {
        let hash = strnhash(dir, dir.len());
        self.normalize_hashed(filespace, dir, hash)
            .unwrap_or_else(|| DirId(filespace.push_str(dir)))
    }

    /// Look up a directory that is expected to have already been
    /// normalized (spec §4.5 pass 2b / §4.7 pass 3 "`normalizedir(..., 0)`"
    /// — lookup only, no creation). Returns `None` if it was never seen.
    #[must_use]
    pub fn lookup(&self, dir: &str) -> Option<DirId> {
        let key = nonzero_hash(strnhash(dir, dir.len()), dir.len());
        let idx = self.normap.get(key)? as usize;
        match self.norq.get(idx)? {
            (_, NorqEntry::Done(id)) => Some(*id),
            (_, NorqEntry::InProgress) => None,
        }
    }

    /// Returns `None` on cycle detection (spec §4.6 "Cycle handling").
    fn normalize_hashed(
        &mut self,
        filespace: &mut Filespace,
        dir: &str,
        hash: u32,
    ) -> Option<DirId> {
        let key = nonzero_hash(hash, dir.len());

        if let Some(idx) = self.normap.get(key) {
            let idx = idx as usize;
            let (stored_off, state) = self.norq[idx];
            if filespace.str_at(stored_off) == dir {
                return match state {
                    NorqEntry::Done(id) => Some(id),
                    NorqEntry::InProgress => None,
                };
            }
        }

        let original_off = filespace.push_str(dir);
        let my_idx = self.norq.len();
        self.norq.push((original_off, NorqEntry::InProgress));
        self.normap.insert(key, u32::try_from(my_idx).unwrap_or(u32::MAX));

        let resolved = match &self.strategy {
            Strategy::Stat => self.unify_with_stat(filespace, dir),
            Strategy::Canon { root } => {
                let root = root.clone();
                self.unify_with_canon(filespace, dir, root.as_deref())
            }
        };

        self.norq[my_idx].1 = NorqEntry::Done(resolved);
        Some(resolved)
    }

    // -- stat mode -----------------------------------------------------

    fn unify_with_stat(&mut self, filespace: &mut Filespace, dir: &str) -> DirId {
        let trimmed = dir.strip_suffix('/').unwrap_or(dir);
        let path = if trimmed.is_empty() { "/" } else { trimmed };

        let Ok(meta) = std::fs::metadata(path) else {
            return DirId(filespace.push_str(dir));
        };

        let key = stat_key(&meta);
        if let Some(statmap) = &self.statmap
            && let Some(idx) = statmap.get(stat_hash(&key))
        {
            let idx = idx as usize;
            if self.stat_keys.get(idx) == Some(&key) {
                if let (_, NorqEntry::Done(id)) = self.norq[idx] {
                    return id;
                }
            }
        }

        let off = filespace.push(&key);
        let new_idx = self.stat_keys.len();
        self.stat_keys.push(key);
        if let Some(statmap) = &mut self.statmap {
            statmap.insert(stat_hash(&key), u32::try_from(new_idx).unwrap_or(u32::MAX));
        }
        DirId(off)
    }

    // -- canon mode ------------------------------------------------------

    fn unify_with_canon(
        &mut self,
        filespace: &mut Filespace,
        dir: &str,
        root: Option<&Path>,
    ) -> DirId {
        let trimmed = dir.trim_end_matches('/');
        if !trimmed.starts_with('/') || trimmed.is_empty() {
            return DirId(filespace.push_str(dir));
        }

        let (parent_raw, basename) = split_dirname(trimmed);

        if basename == "." {
            let parent_hash = strnhash(parent_raw, parent_raw.len());
            return self
                .normalize_hashed(filespace, parent_raw, parent_hash)
                .unwrap_or_else(|| DirId(filespace.push_str(dir)));
        }
        if basename == ".." {
            let parent_hash = strnhash(parent_raw, parent_raw.len());
            let Some(parent_id) = self.normalize_hashed(filespace, parent_raw, parent_hash) else {
                return DirId(filespace.push_str(dir));
            };
            let parent_str = filespace.str_at(parent_id.0).to_owned();
            if parent_str.len() <= 1 {
                return parent_id; // hit the root
            }
            let (grandparent, _) = split_dirname(parent_str.trim_end_matches('/'));
            let gp_hash = strnhash(grandparent, grandparent.len());
            return self
                .normalize_hashed(filespace, grandparent, gp_hash)
                .unwrap_or(parent_id);
        }

        let parent_hash = strnhash(parent_raw, parent_raw.len());
        let Some(parent_id) = self.normalize_hashed(filespace, parent_raw, parent_hash) else {
            return DirId(filespace.push_str(dir));
        };
        let parent_str = filespace.str_at(parent_id.0).to_owned();
        let candidate = format!("{parent_str}{basename}/");

        let fs_path = root_join(root, &candidate);
        let lstat = std::fs::symlink_metadata(&fs_path);
        let is_symlink = lstat.as_ref().map(std::fs::Metadata::is_symlink).unwrap_or(false);

        if !is_symlink {
            let new_hash = strnhash(&candidate, candidate.len());
            return self
                .normalize_hashed(filespace, &candidate, new_hash)
                .unwrap_or_else(|| DirId(filespace.push_str(&candidate)));
        }

        let Ok(target) = std::fs::read_link(&fs_path) else {
            return DirId(filespace.push_str(&candidate));
        };
        let mut target_str = target.to_string_lossy().into_owned();
        if target_str.is_empty() {
            return parent_id;
        }
        if !target_str.ends_with('/') {
            target_str.push('/');
        }
        let absolute = if target_str.starts_with('/') {
            target_str
        } else {
            format!("{parent_str}{target_str}")
        };
        let hash = strnhash(&absolute, absolute.len());
        self.normalize_hashed(filespace, &absolute, hash)
            .unwrap_or_else(|| DirId(filespace.push_str(&candidate)))
    }
}

/// Split `path` (no trailing slash) into `(dirname-with-trailing-slash,
/// basename)`. `"/"` splits to `("/", "")`.
fn split_dirname(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => (&path[..1], &path[1..]),
        Some(i) => (&path[..=i], &path[i + 1..]),
        None => ("/", path),
    }
}

fn root_join(root: Option<&Path>, candidate: &str) -> PathBuf {
    root.map_or_else(
        || PathBuf::from(candidate),
        |r| {
            let stripped = candidate.strip_prefix('/').unwrap_or(candidate);
            r.join(stripped)
        },
    )
}

#[cfg(unix)]
fn stat_key(meta: &std::fs::Metadata) -> [u8; 16] {
    use std::os::unix::fs::MetadataExt;
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&meta.ino().to_le_bytes());
    key[8..].copy_from_slice(&(meta.dev() as u64).to_le_bytes());
    key
}

#[cfg(not(unix))]
fn stat_key(_meta: &std::fs::Metadata) -> [u8; 16] {
    [0u8; 16]
}

/// Hash for the 16-byte stat key: `hx = hx*13 + byte`, folded from the
/// high byte down, matching the original's `unifywithstat` exactly.
fn stat_hash(key: &[u8; 16]) -> u32 {
    let mut hx: u32 = 0;
    for &b in key.iter().rev() {
        hx = hx.wrapping_mul(13).wrapping_add(u32::from(b));
    }
    if hx == 0 { 1 } else { hx }
}

/// Convenience used by stat mode to compare two real directories for
/// identity without going through the hash table — kept for callers that
/// already hold two paths and want a direct answer (e.g. tests).
#[must_use]
pub fn same_directory(a: &Path, b: &Path) -> bool {
    is_same_file(a, b).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_dirname_root() {
        assert_eq!(split_dirname("/"), ("/", ""));
    }

    #[test]
    fn split_dirname_nested() {
        assert_eq!(split_dirname("/usr/lib"), ("/usr/", "lib"));
    }

    #[test]
    fn split_dirname_top_level() {
        assert_eq!(split_dirname("/usr"), ("/", "usr"));
    }

    #[test]
    fn stat_mode_unifies_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = Filespace::new();
        let mut norm = DirNormalizer::stat_mode(8);

        let a = format!("{}/", dir.path().display());
        let id_a = norm.normalize(&mut fs, &a);
        let id_b = norm.normalize(&mut fs, &a);
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn stat_mode_distinguishes_different_directories() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mut fs = Filespace::new();
        let mut norm = DirNormalizer::stat_mode(8);

        let a = format!("{}/", dir_a.path().display());
        let b = format!("{}/", dir_b.path().display());
        assert_ne!(norm.normalize(&mut fs, &a), norm.normalize(&mut fs, &b));
    }

    #[test]
    fn stat_mode_nonexistent_directory_falls_back_to_self() {
        let mut fs = Filespace::new();
        let mut norm = DirNormalizer::stat_mode(8);
        let id = norm.normalize(&mut fs, "/definitely/does/not/exist/");
        // Must not panic and must return something stable on repeat.
        let id2 = norm.normalize(&mut fs, "/definitely/does/not/exist/");
        assert_eq!(id, id2);
    }

    #[test]
    fn canon_mode_resolves_symlinked_directory_alias() {
        let real = tempfile::tempdir().unwrap();
        let parent = tempfile::tempdir().unwrap();
        let link = parent.path().join("lib");
        #[cfg(unix)]
        std::os::unix::fs::symlink(real.path(), &link).unwrap();

        #[cfg(unix)]
        {
            let mut fs = Filespace::new();
            let mut norm = DirNormalizer::canon_mode(8, None);

            let via_link = format!("{}/", link.display());
            let direct = format!("{}/", real.path().display());

            let id_link = norm.normalize(&mut fs, &via_link);
            let id_direct = norm.normalize(&mut fs, &direct);
            assert_eq!(id_link, id_direct);
        }
    }

    #[test]
    fn canon_mode_dot_returns_parent() {
        let mut fs = Filespace::new();
        let mut norm = DirNormalizer::canon_mode(8, None);
        let base = tempfile::tempdir().unwrap();
        let dir = format!("{}/", base.path().display());
        let dot = format!("{}/./", base.path().display());
        let id_dir = norm.normalize(&mut fs, &dir);
        let id_dot = norm.normalize(&mut fs, &dot);
        assert_eq!(id_dir, id_dot);
    }

    #[test]
    fn same_directory_true_for_identical_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(same_directory(dir.path(), dir.path()));
    }
}
