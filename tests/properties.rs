//! Property-based tests for the quantified invariants in spec.md §8:
//! determinism under order-preserving permutation (property 1) and
//! hash-collision tolerance (property 8).

use std::collections::HashSet;

use proptest::prelude::*;

use pkgconflict::{Color, DetectorConfig, FileEntry, FileIterator, FileMode, find_file_conflicts};

#[derive(Clone, Debug)]
struct FakeFile {
    path: String,
    digest: u8,
}

struct FakePackages {
    packages: Vec<Vec<FakeFile>>,
}

impl FileIterator<usize, usize> for FakePackages {
    fn handle_for(&self, id: &usize) -> Option<usize> {
        (*id < self.packages.len()).then_some(*id)
    }

    fn iterate(
        &self,
        handle: &usize,
        flags: pkgconflict::IterFlags,
        visit: &mut dyn FnMut(&FileEntry),
    ) -> Result<(), pkgconflict::error::IteratorError> {
        if flags.only_directories {
            return Ok(());
        }
        for f in &self.packages[*handle] {
            let dir_len = f.path.rfind('/').map_or(0, |i| i + 1);
            visit(&FileEntry {
                path: f.path.clone(),
                dir_len,
                dir_index: 0,
                mode: FileMode::Regular,
                digest: [f.digest; 32],
                color: Color(0),
                is_ghost: false,
            });
        }
        Ok(())
    }
}

/// A set of `(path, digest1, path, digest2)` tuples, independent of which
/// *position in the id list* reported them — used to compare two runs'
/// conflict sets modulo reordering within a partition.
fn conflict_shape(
    conflicts: &[pkgconflict::Conflict],
) -> HashSet<(String, [u8; 32], String, [u8; 32])> {
    conflicts
        .iter()
        .map(|c| (c.path1.clone(), c.digest1, c.path2.clone(), c.digest2))
        .collect()
}

/// `n` packages all providing the same path with a distinct digest each,
/// so every pair conflicts unconditionally regardless of hashing or
/// ordering — isolates the property under test from incidental digest
/// equality.
fn all_conflicting_packages(n: usize) -> Vec<Vec<FakeFile>> {
    (0..n)
        .map(|i| {
            vec![FakeFile {
                path: "/etc/shared.conf".to_owned(),
                digest: u8::try_from(i).unwrap_or(u8::MAX),
            }]
        })
        .collect()
}

/// Reorder `ids` by sorting the candidate prefix `[0, cutoff)` and the
/// installed suffix `[cutoff, n)` independently by the supplied sort
/// keys, without ever moving an id across the cutoff boundary.
fn reorder_within_partitions(ids: &[usize], cutoff: usize, keys: &[i32]) -> Vec<usize> {
    let cutoff = cutoff.min(ids.len());
    let mut candidate_part = ids[..cutoff].to_vec();
    let mut installed_part = ids[cutoff..].to_vec();
    candidate_part.sort_by_key(|&id| keys[id]);
    installed_part.sort_by_key(|&id| keys[id]);
    candidate_part.extend(installed_part);
    candidate_part
}

proptest! {
    /// Permuting the candidate prefix and the installed suffix
    /// independently (never moving a package across the cutoff boundary)
    /// must not change which (path, digest) conflicts are reported (spec
    /// §8 property 1).
    #[test]
    fn permutation_within_partitions_preserves_conflict_shape(
        keys in proptest::collection::vec(any::<i32>(), 4),
        cutoff in 0usize..=4,
    ) {
        let packages = all_conflicting_packages(4);
        let pkgs = FakePackages { packages };
        let ids: Vec<usize> = (0..4).collect();
        let config = DetectorConfig::default();

        let baseline = find_file_conflicts(&ids, cutoff, &pkgs, &config);
        let reordered = reorder_within_partitions(&ids, cutoff, &keys);
        let permuted = find_file_conflicts(&reordered, cutoff, &pkgs, &config);

        prop_assert_eq!(conflict_shape(&baseline), conflict_shape(&permuted));
    }

    /// `n` packages each share one path with a distinct digest: the
    /// conflict count must always be `C(n, 2)` regardless of how the
    /// rolling hash happens to cluster their path-hash keys (spec §8
    /// property 8, exercised at the whole-detector level — collisions
    /// inside `GrowableHashMap` must still resolve correctly through the
    /// stored-key comparison in `slot_index`, not just avoid panicking).
    #[test]
    fn degenerate_hash_collisions_do_not_change_the_conflict_set(n in 2usize..8) {
        let packages = all_conflicting_packages(n);
        let pkgs = FakePackages { packages };
        let ids: Vec<usize> = (0..n).collect();
        let config = DetectorConfig::default();

        let conflicts = find_file_conflicts(&ids, 0, &pkgs, &config);
        let expected = n * (n - 1) / 2;
        prop_assert_eq!(conflicts.len(), expected);
    }
}
