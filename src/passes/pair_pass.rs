//! Pass 4 — pair comparison and conflict emission (spec §4.8). Consumes
//! the materialized candidates from pass 3, re-grouped by `(hx, dir_id)`,
//! and decides for every ordered pair within a group whether the two
//! packages genuinely conflict.

use tracing::instrument;

use crate::model::{Candidate, Conflict};

fn basename(path: &str) -> &str {
    path.rfind('/').map_or(path, |i| &path[i + 1..])
}

/// Run pass 4. `alias_mode` selects basename-only comparison (directories
/// already unified via `dir_id`, spec §4.8 step 2); non-alias mode compares
/// full paths.
#[instrument(skip(candidates), fields(candidates = candidates.len()))]
pub fn run(candidates: &[Candidate], cutoff: usize, alias_mode: bool) -> Vec<Conflict> {
    let mut grouped = candidates.to_vec();
    grouped.sort_by_key(|c| (c.hx, c.dir_id.map(|d| d.0)));

    let mut conflicts = Vec::new();
    let mut i = 0;
    while i < grouped.len() {
        let mut j = i + 1;
        while j < grouped.len()
            && grouped[j].hx == grouped[i].hx
            && grouped[j].dir_id.map(|d| d.0) == grouped[i].dir_id.map(|d| d.0)
        {
            j += 1;
        }
        emit_group(&grouped[i..j], cutoff, alias_mode, &mut conflicts);
        i = j;
    }

    conflicts.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    conflicts.dedup_by(|a, b| a.sort_key() == b.sort_key());
    conflicts
}

fn emit_group(group: &[Candidate], cutoff: usize, alias_mode: bool, out: &mut Vec<Conflict>) {
    for a in 0..group.len() {
        for b in (a + 1)..group.len() {
            if let Some(conflict) = compare_pair(&group[a], &group[b], cutoff, alias_mode) {
                out.push(conflict);
            }
        }
    }
}

fn compare_pair(a: &Candidate, b: &Candidate, cutoff: usize, alias_mode: bool) -> Option<Conflict> {
    if a.package.as_usize() >= cutoff && b.package.as_usize() >= cutoff {
        return None;
    }
    if a.package == b.package {
        return None;
    }
    let (Some(path_a), Some(path_b)) = (a.path.as_deref(), b.path.as_deref()) else {
        return None;
    };

    let same_name = if alias_mode {
        basename(path_a) == basename(path_b)
    } else {
        path_a == path_b
    };
    if !same_name {
        return None; // hx collision, not a real conflict
    }

    let (Some(digest_a), Some(digest_b)) = (a.digest, b.digest) else {
        return None;
    };
    if digest_a == digest_b {
        return None;
    }
    if a.color.disjoint(b.color) {
        return None;
    }

    order_pair(a, b, path_a, path_b, digest_a, digest_b)
}

/// Builds the conflict tuple with `(path1, package1) <= (path2, package2)`
/// so the final total order (spec §3 invariant 6) is stable regardless of
/// which candidate was `a` and which was `b` in the group scan.
fn order_pair(
    a: &Candidate,
    b: &Candidate,
    path_a: &str,
    path_b: &str,
    digest_a: [u8; 32],
    digest_b: [u8; 32],
) -> Option<Conflict> {
    let a_first = (path_a, a.package) <= (path_b, b.package);
    let (path1, package1, digest1, path2, package2, digest2) = if a_first {
        (path_a, a.package, digest_a, path_b, b.package, digest_b)
    } else {
        (path_b, b.package, digest_b, path_a, a.package, digest_a)
    };
    Some(Conflict {
        path1: path1.to_owned(),
        package1,
        digest1,
        path2: path2.to_owned(),
        package2,
        digest2,
    })
}
