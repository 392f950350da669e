//! Driver / job controller (spec §4.1): orchestrates the four passes,
//! owns the scratch arenas, and implements cutoff semantics.

use std::time::Instant;

use tracing::instrument;

use crate::config::DetectorConfig;
use crate::filelist::FileIterator;
use crate::filespace::Filespace;
use crate::model::Conflict;
use crate::normalize::DirNormalizer;
use crate::passes::{dir_pass, expand_pass, file_pass, pair_pass};

/// Resolve the caller-supplied cutoff to the effective candidate/installed
/// boundary: `0` (or anything `>= n`) means "everything is a candidate"
/// (spec §4.1).
#[must_use]
fn effective_cutoff(cutoff: usize, n: usize) -> usize {
    if cutoff == 0 { n } else { cutoff.min(n) }
}

/// Find every pair of packages in `ids` that would write different content
/// to the same absolute path.
///
/// `ids[0..cutoff]` is the candidate prefix (newly-installed packages that
/// may originate a conflict); `ids[cutoff..]` is the already-installed
/// suffix, reported against but never conflicting among themselves. Never
/// fails: unreadable packages, failed `stat`s and cyclic symlinks all
/// degrade silently per spec §7 and are reflected only in the debug log.
#[instrument(skip(ids, iterator, config), fields(packages = ids.len(), cutoff))]
pub fn find_file_conflicts<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    cutoff: usize,
    iterator: &I,
    config: &DetectorConfig,
) -> Vec<Conflict> {
    let n = ids.len();
    let cutoff = effective_cutoff(cutoff, n);
    let alias_mode = config.flags.check_dir_aliasing;

    let (candidates, normalizer) = if alias_mode {
        let (candidates, normalizer) = run_alias_mode(ids, iterator, config);
        (candidates, Some(normalizer))
    } else {
        (run_non_alias_mode(ids, cutoff, iterator, config), None)
    };

    let started = Instant::now();
    let pruned = expand_pass::prune(candidates, cutoff);
    let materialized = expand_pass::run(pruned, ids, iterator, normalizer.as_ref(), config);
    let conflicts = pair_pass::run(&materialized, cutoff, alias_mode);

    tracing::info!(
        pass = "driver",
        conflicts = conflicts.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "conflict detection complete"
    );

    conflicts
}

fn run_non_alias_mode<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    cutoff: usize,
    iterator: &I,
    config: &DetectorConfig,
) -> Vec<crate::model::Candidate> {
    let interesting = dir_pass::run(ids, cutoff, iterator, config);
    file_pass::run_non_alias(ids, &interesting, iterator, config)
}

fn run_alias_mode<P, H, I: FileIterator<P, H>>(
    ids: &[P],
    iterator: &I,
    config: &DetectorConfig,
) -> (Vec<crate::model::Candidate>, DirNormalizer) {
    let mut interesting = vec![false; ids.len()];
    let file_map = file_pass::run_alias_sweep1(ids, &mut interesting, iterator, config);

    #[allow(clippy::cast_possible_truncation)]
    let hint = (ids.len() as u32)
        .saturating_mul(config.budget.normap_ratio)
        .max(1);
    let mut normalizer = if config.flags.use_root_dir {
        DirNormalizer::canon_mode(hint, config.root_dir.clone())
    } else {
        DirNormalizer::stat_mode(hint)
    };
    let mut filespace = Filespace::new();

    let candidates = file_pass::run_alias_sweep2(
        ids,
        &interesting,
        &file_map,
        &mut normalizer,
        &mut filespace,
        iterator,
    );
    (candidates, normalizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_cutoff_defaults_zero_to_n() {
        assert_eq!(effective_cutoff(0, 10), 10);
    }

    #[test]
    fn effective_cutoff_clamps_to_n() {
        assert_eq!(effective_cutoff(100, 10), 10);
    }

    #[test]
    fn effective_cutoff_passes_through_in_range_value() {
        assert_eq!(effective_cutoff(3, 10), 3);
    }

    struct OnePackage;

    impl FileIterator<usize, usize> for OnePackage {
        fn handle_for(&self, id: &usize) -> Option<usize> {
            Some(*id)
        }

        fn iterate(
            &self,
            _handle: &usize,
            _flags: crate::filelist::IterFlags,
            _visit: &mut dyn FnMut(&crate::model::FileEntry),
        ) -> Result<(), crate::error::IteratorError> {
            Ok(())
        }
    }

    #[tracing_test::traced_test]
    #[test]
    fn emits_a_pass_boundary_summary_line_on_completion() {
        let config = DetectorConfig::default();
        let _ = find_file_conflicts(&[0usize, 1], 0, &OnePackage, &config);
        assert!(logs_contain("conflict detection complete"));
    }
}
