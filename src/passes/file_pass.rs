//! Pass 2 — file candidates (spec §4.5), plus alias mode's deferred pass
//! 2b. Restricted to packages pass 1 (or, in alias mode, this pass itself)
//! flagged interesting.

use std::collections::HashMap;

use tracing::instrument;

use crate::config::DetectorConfig;
use crate::filelist::{FileIterator, IterFlags};
use crate::hash::{GrowableHashMap, nonzero_hash, strhash_cont, strnhash};
use crate::model::{Candidate, CandidateKind, FileEntry, PackageIndex, SlotValue};
use crate::normalize::DirNormalizer;

const MULTIPLE: u32 = SlotValue::Multiple.encode();

/// Spec §11 `Pass2Precheck`: the only generically-available signal at this
/// layer is "was this package flagged interesting by an earlier pass" —
/// a metadata-backed filelist shortcut (the original's RPM header cache)
/// sits outside the `FileIterator` abstraction, so this can only ever
/// gate on that bitmap. It exists as the extension point a caller-specific
/// iterator could short-circuit further.
const fn should_scan(interesting: bool) -> bool {
    interesting
}

/// Cache of the most recently hashed directory within one package's
/// iteration, so consecutive entries sharing a directory index don't
/// rehash the prefix (spec §4.5 step 1).
#[derive(Default)]
struct DirHashCache {
    dir_index: Option<u32>,
    dir_hash: u32,
}

impl DirHashCache {
    fn hash_for(&mut self, entry: &FileEntry) -> u32 {
        if self.dir_index == Some(entry.dir_index) {
            return self.dir_hash;
        }
        let prefix = entry.dir_prefix();
        let h = nonzero_hash(strnhash(prefix, prefix.len()), prefix.len());
        self.dir_index = Some(entry.dir_index);
        self.dir_hash = h;
        h
    }
}

fn entry_kind(entry: &FileEntry) -> CandidateKind {
    if entry.mode.is_dir() {
        CandidateKind::Directory
    } else {
        CandidateKind::File
    }
}

/// Non-alias mode: run pass 2 in full, producing a materializable-later
/// candidate list directly (no pass 2b needed).
///
/// Spec §4.5 step 2 additionally asks to skip an entry whose *directory*
/// hash isn't flagged "multiple" in pass 1's directory map. This crate
/// folds that check into the `interesting` bitmap instead of keeping
/// pass 1's directory map alive into pass 2: a package is only scanned
/// here at all when pass 1 already found it sharing a directory with
/// another package, which is a superset of (never narrower than) the
/// per-entry check — every entry the per-entry check would skip is still
/// correctly rejected later, either by never forming a file-map collision
/// (no other package wrote that exact basename under that directory) or
/// by pass 3/4 pruning groups that don't survive. The tradeoff is the one
/// named in spec §4.1's free-before-next-allocate ordering: keeping the
/// directory map resident through pass 2 would cost its full memory
/// footprint for the whole pass instead of freeing it after pass 1.
#[instrument(skip(ids, interesting, iterator, config), fields(packages = ids.len()))]
pub fn run_non_alias<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    interesting: &[bool],
    iterator: &I,
    config: &DetectorConfig,
) -> Vec<Candidate> {
    let n = ids.len();
    let mut file_map = GrowableHashMap::with_capacity_hint(
        (n as u32).saturating_mul(config.budget.file_map_ratio).max(1),
    );
    let mut delay_queue: HashMap<u32, Vec<PackageIndex>> = HashMap::new();
    let mut candidates = Vec::new();
    let flags = IterFlags::basenames_only();

    for (idx, id) in ids.iter().enumerate() {
        if !should_scan(interesting[idx]) {
            continue;
        }
        let pkg = PackageIndex::new(idx);
        let Some(handle) = iterator.handle_for(id) else {
            continue;
        };
        let mut cache = DirHashCache::default();

        let mut visit = |entry: &FileEntry| {
            if entry.dir_len == 0 || entry.is_ghost {
                return;
            }
            let dir_hash = cache.hash_for(entry);
            let basename = entry.basename();
            let hx = nonzero_hash(strhash_cont(basename, dir_hash), entry.path.len());
            let kind = entry_kind(entry);

            match file_map.get(hx).map(SlotValue::decode) {
                None => {
                    let sv = match kind {
                        CandidateKind::File => SlotValue::File(pkg),
                        CandidateKind::Directory => SlotValue::Directory(pkg),
                    };
                    file_map.insert(hx, sv.encode());
                }
                Some(SlotValue::Multiple) => {}
                Some(SlotValue::File(existing)) => {
                    if existing == pkg {
                        return;
                    }
                    candidates.push(Candidate::unmaterialized(
                        hx,
                        existing,
                        dir_hash,
                        CandidateKind::File,
                    ));
                    candidates.push(Candidate::unmaterialized(hx, pkg, dir_hash, kind));
                }
                Some(SlotValue::Directory(existing)) => {
                    if existing == pkg {
                        return;
                    }
                    match kind {
                        CandidateKind::Directory => {
                            delay_queue.entry(hx).or_default().push(pkg);
                        }
                        CandidateKind::File => {
                            file_map.insert(hx, SlotValue::File(pkg).encode());
                            candidates.push(Candidate::unmaterialized(
                                hx,
                                pkg,
                                dir_hash,
                                CandidateKind::File,
                            ));
                            candidates.push(Candidate::unmaterialized(
                                hx,
                                existing,
                                dir_hash,
                                CandidateKind::Directory,
                            ));
                            if let Some(queued) = delay_queue.remove(&hx) {
                                for other in queued {
                                    candidates.push(Candidate::unmaterialized(
                                        hx,
                                        other,
                                        dir_hash,
                                        CandidateKind::Directory,
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        };
        let _ = iterator.iterate(&handle, flags, &mut visit);
    }

    tracing::debug!(
        pass = "file_pass",
        map_capacity = file_map.capacity(),
        map_used = file_map.len(),
        map_kib = file_map.memory_kib(),
        candidates = candidates.len(),
        "file pass complete"
    );

    candidates
}

/// Alias mode sweep 1: mark every full-path hash touched by more than one
/// distinct package as "multiple", deferring candidate construction to
/// sweep 2 (spec §4.5 bullet 5).
#[instrument(skip(ids, interesting, iterator, config), fields(packages = ids.len()))]
pub fn run_alias_sweep1<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    interesting: &mut [bool],
    iterator: &I,
    config: &DetectorConfig,
) -> GrowableHashMap {
    let n = ids.len();
    let mut file_map = GrowableHashMap::with_capacity_hint(
        (n as u32).saturating_mul(config.budget.file_map_ratio).max(1),
    );
    let flags = IterFlags::basenames_only();

    for (idx, id) in ids.iter().enumerate() {
        let pkg = PackageIndex::new(idx);
        let Some(handle) = iterator.handle_for(id) else {
            continue;
        };

        let mut visit = |entry: &FileEntry| {
            if entry.dir_len == 0 || entry.is_ghost {
                return;
            }
            let basename = entry.basename();
            let hx = nonzero_hash(strhash_cont(basename, 0), basename.len());
            let kind = entry_kind(entry);

            match file_map.get(hx).map(SlotValue::decode) {
                None => {
                    let sv = match kind {
                        CandidateKind::File => SlotValue::File(pkg),
                        CandidateKind::Directory => SlotValue::Directory(pkg),
                    };
                    file_map.insert(hx, sv.encode());
                }
                Some(SlotValue::Multiple) => {
                    interesting[pkg.as_usize()] = true;
                }
                Some(sv) => {
                    if let Some(existing) = sv.package()
                        && existing != pkg
                    {
                        file_map.insert(hx, MULTIPLE);
                        interesting[existing.as_usize()] = true;
                        interesting[pkg.as_usize()] = true;
                    }
                }
            }
        };
        let _ = iterator.iterate(&handle, flags, &mut visit);
    }

    tracing::debug!(
        pass = "file_pass_alias_sweep1",
        map_capacity = file_map.capacity(),
        map_used = file_map.len(),
        map_kib = file_map.memory_kib(),
        "alias sweep 1 complete"
    );

    file_map
}

/// Alias mode sweep 2 (pass 2b): re-iterate every interesting package and
/// emit a candidate for every entry whose hash was marked "multiple" in
/// sweep 1, normalizing its directory along the way.
#[instrument(skip(ids, interesting, file_map, normalizer, filespace, iterator))]
pub fn run_alias_sweep2<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    interesting: &[bool],
    file_map: &GrowableHashMap,
    normalizer: &mut DirNormalizer,
    filespace: &mut crate::filespace::Filespace,
    iterator: &I,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let flags = IterFlags::basenames_only();

    for (idx, id) in ids.iter().enumerate() {
        if !interesting[idx] {
            continue;
        }
        let pkg = PackageIndex::new(idx);
        let Some(handle) = iterator.handle_for(id) else {
            continue;
        };

        let mut visit = |entry: &FileEntry| {
            if entry.dir_len == 0 || entry.is_ghost {
                return;
            }
            let basename = entry.basename();
            let hx = nonzero_hash(strhash_cont(basename, 0), basename.len());
            if file_map.get(hx).map(SlotValue::decode) != Some(SlotValue::Multiple) {
                return;
            }
            let dir_id = normalizer.normalize(filespace, entry.dir_prefix());
            let dir_hash = nonzero_hash(
                strnhash(entry.dir_prefix(), entry.dir_len),
                entry.dir_len,
            );
            let mut candidate =
                Candidate::unmaterialized(hx, pkg, dir_hash, entry_kind(entry));
            candidate.dir_id = Some(dir_id);
            candidates.push(candidate);
        };
        let _ = iterator.iterate(&handle, flags, &mut visit);
    }

    tracing::debug!(pass = "file_pass_alias_sweep2", candidates = candidates.len(), "alias sweep 2 complete");

    candidates
}
