//! Pass 1 — directory conflicts (spec §4.4). Builds a directory →
//! {single package | multiple packages} map and, from it, the
//! interesting-package bitmap that gates every later pass. Skipped
//! entirely in alias mode (spec §11: alias mode has no directory map at
//! all, since pass 2's basename hashing does the marking instead).

use tracing::instrument;

use crate::config::DetectorConfig;
use crate::filelist::{FileIterator, IterFlags};
use crate::hash::{GrowableHashMap, nonzero_hash, strhash};
use crate::model::PackageIndex;

const SINGLE_MULTIPLE: u32 = u32::MAX;

/// Run pass 1 over `ids[0..n]`. Returns a bitmap, one entry per package,
/// set for every package that shares a directory hash with at least one
/// other package in the set (spec §3 invariant 2).
#[instrument(skip(ids, iterator, config), fields(packages = ids.len()))]
pub fn run<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    cutoff: usize,
    iterator: &I,
    config: &DetectorConfig,
) -> Vec<bool> {
    let n = ids.len();
    let mut interesting = vec![false; n];
    let mut dir_map = GrowableHashMap::with_capacity_hint(
        (n as u32).saturating_mul(config.budget.dir_map_ratio).max(1),
    );
    let flags = IterFlags::directories_only();

    for (idx, id) in ids.iter().enumerate() {
        let pkg = PackageIndex::new(idx);
        let is_candidate = idx < cutoff;
        let Some(handle) = iterator.handle_for(id) else {
            continue;
        };

        let mut visit = |entry: &crate::model::FileEntry| {
            // A directory-list entry's own path IS the directory; hash it
            // whole, not the dir_len-truncated parent prefix a file entry
            // would use for its *containing* directory.
            let dhx = nonzero_hash(strhash(entry.path.as_str()), entry.path.len());
            match dir_map.get(dhx) {
                None => {
                    if is_candidate {
                        dir_map.insert(dhx, pkg.0 + 1);
                    }
                }
                Some(v) if v == SINGLE_MULTIPLE => {
                    // Already "multiple" from earlier packages: still mark
                    // this one interesting, matching the original's
                    // unconditional MAPSET on any hit (including oidx==-1).
                    interesting[pkg.as_usize()] = true;
                }
                Some(v) => {
                    let existing = PackageIndex::new((v - 1) as usize);
                    if existing != pkg {
                        dir_map.insert(dhx, SINGLE_MULTIPLE);
                        interesting[existing.as_usize()] = true;
                        interesting[pkg.as_usize()] = true;
                    }
                }
            }
        };
        let _ = iterator.iterate(&handle, flags, &mut visit);
    }

    tracing::debug!(
        pass = "dir_pass",
        map_capacity = dir_map.capacity(),
        map_used = dir_map.len(),
        map_kib = dir_map.memory_kib(),
        "directory pass complete"
    );

    interesting
}
