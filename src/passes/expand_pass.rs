//! Pruning between passes 2 and 3, then pass 3 — candidate expansion
//! (spec §4.7). Materializes hash-keyed candidates into real paths and
//! digests by re-reading each implicated package's file list exactly once.

use std::collections::{HashMap, HashSet};

use tracing::instrument;

use crate::config::DetectorConfig;
use crate::filelist::{FileIterator, IterFlags};
use crate::hash::{nonzero_hash, strhash_cont, strnhash};
use crate::model::{Candidate, CandidateKind};
use crate::normalize::DirNormalizer;

/// Coarse reject bitmap size (power of two, spec §4.7 step 1 "fast reject
/// of irrelevant entries"). Indexed by the low bits of a directory hash.
const REJECT_MASK: u32 = 0x7ff;

/// Drop candidate groups that cannot possibly yield a reportable conflict
/// (spec §4.7 "Pruning between passes 2 and 3"), after sorting by
/// `(hx, dir_id, package, dir_hash)` so each group is a contiguous run.
#[must_use]
pub fn prune(mut candidates: Vec<Candidate>, cutoff: usize) -> Vec<Candidate> {
    candidates.sort_by_key(|c| (c.hx, c.dir_id.map(|d| d.0), c.package.0, c.dir_hash));

    let mut out = Vec::with_capacity(candidates.len());
    let mut i = 0;
    while i < candidates.len() {
        let mut j = i + 1;
        while j < candidates.len()
            && candidates[j].hx == candidates[i].hx
            && candidates[j].dir_id.map(|d| d.0) == candidates[i].dir_id.map(|d| d.0)
        {
            j += 1;
        }
        if group_survives(&candidates[i..j], cutoff) {
            out.extend_from_slice(&candidates[i..j]);
        }
        i = j;
    }
    out
}

fn group_survives(group: &[Candidate], cutoff: usize) -> bool {
    let distinct: HashSet<_> = group.iter().map(|c| c.package).collect();
    if distinct.len() < 2 {
        return false;
    }
    if group.iter().all(|c| c.kind == CandidateKind::Directory) {
        return false;
    }
    if group.iter().all(|c| c.package.as_usize() >= cutoff) {
        return false;
    }
    true
}

/// Pass 3: re-read each implicated package's file list once, filling in
/// `path`/`digest`/`color` for every surviving candidate. A package whose
/// handle cannot be obtained has its whole block dropped (spec §11, last
/// bullet — mirrors the original's `if (!handle) continue`).
#[instrument(skip(candidates, ids, iterator, normalizer, config), fields(candidates = candidates.len()))]
pub fn run<P, H, I: FileIterator<P, H>>(
    candidates: Vec<Candidate>,
    ids: &[P],
    iterator: &I,
    normalizer: Option<&DirNormalizer>,
    _config: &DetectorConfig,
) -> Vec<Candidate> {
    // Colors cost nothing extra to request; the iterator implementation
    // decides whether computing them is actually expensive for a given
    // package format (spec §4.3 "optionally a ... color").
    let with_color = true;
    let mut by_package = candidates;
    by_package.sort_by_key(|c| c.package.0);

    let mut result = Vec::with_capacity(by_package.len());
    let mut fetches = 0usize;
    let mut i = 0;
    while i < by_package.len() {
        let mut j = i + 1;
        while j < by_package.len() && by_package[j].package == by_package[i].package {
            j += 1;
        }
        let pkg = by_package[i].package;
        let Some(id) = ids.get(pkg.as_usize()) else {
            i = j;
            continue;
        };
        let Some(handle) = iterator.handle_for(id) else {
            i = j;
            continue;
        };

        let mut bitmap = vec![false; REJECT_MASK as usize + 1];
        let mut fetch_index: HashMap<u32, Vec<usize>> = HashMap::new();
        let mut slots: Vec<Candidate> = by_package[i..j].to_vec();
        for (slot, c) in slots.iter().enumerate() {
            bitmap[(c.dir_hash & REJECT_MASK) as usize] = true;
            let key = fetch_key(c.hx, c.dir_id.map(|d| d.0));
            fetch_index.entry(key).or_default().push(slot);
        }

        fetches += 1;
        let flags = IterFlags::with_digests(with_color);
        let mut visit = |entry: &crate::model::FileEntry| {
            if entry.dir_len == 0 || entry.is_ghost {
                return;
            }
            let dir_hash =
                nonzero_hash(strnhash(entry.dir_prefix(), entry.dir_len), entry.dir_len);
            if !bitmap[(dir_hash & REJECT_MASK) as usize] {
                return;
            }
            // Alias-mode candidates (file_pass::run_alias_sweep2) are keyed
            // by a basename-only hash seeded at 0, not the directory-hash
            // extension non-alias mode uses — the two must match or every
            // candidate in alias mode goes unmaterialized (spec §4.5
            // bullet 5, §4.7 step 2).
            let basename = entry.basename();
            let hx = if normalizer.is_some() {
                nonzero_hash(strhash_cont(basename, 0), basename.len())
            } else {
                nonzero_hash(strhash_cont(basename, dir_hash), entry.path.len())
            };
            let dir_id = normalizer.and_then(|n| n.lookup(entry.dir_prefix()));
            let key = fetch_key(hx, dir_id.map(|d| d.0));
            let Some(matches) = fetch_index.get(&key) else {
                return;
            };
            for &slot in matches {
                if slots[slot].hx == hx {
                    slots[slot].path = Some(entry.path.clone());
                    slots[slot].digest = Some(entry.digest);
                    slots[slot].color = entry.color;
                }
            }
        };
        let _ = iterator.iterate(&handle, flags, &mut visit);

        result.extend(slots.into_iter().filter(|c| c.path.is_some()));
        i = j;
    }

    tracing::debug!(
        pass = "expand_pass",
        header_fetches = fetches,
        materialized = result.len(),
        "candidate expansion complete"
    );

    result
}

fn fetch_key(hx: u32, dir_id: Option<u32>) -> u32 {
    hx ^ dir_id.unwrap_or(0).wrapping_mul(37)
}
