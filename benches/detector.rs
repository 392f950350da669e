//! Detector benchmarks.
//!
//! Measures `find_file_conflicts` across package-set sizes and conflict
//! densities, in both non-alias and alias (directory-aliasing) modes.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench detector
//! cargo bench --bench detector -- non_alias
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use pkgconflict::error::IteratorError;
use pkgconflict::{
    Color, DetectFlags, DetectorConfig, FileEntry, FileIterator, FileMode, IterFlags,
    find_file_conflicts,
};

#[derive(Clone)]
struct BenchFile {
    path: String,
    mode: FileMode,
    digest: [u8; 32],
    color: Color,
}

/// A synthetic package set: `n` packages, each owning `files_per_pkg`
/// files under its own subtree, plus every `conflict_stride`-th package
/// sharing one path (and differing digest) with its predecessor.
struct SyntheticPackages {
    packages: Vec<Vec<BenchFile>>,
}

impl SyntheticPackages {
    fn build(n: usize, files_per_pkg: usize, conflict_stride: usize) -> Self {
        let mut packages = Vec::with_capacity(n);
        for i in 0..n {
            let mut files = Vec::with_capacity(files_per_pkg);
            for j in 0..files_per_pkg {
                files.push(BenchFile {
                    path: format!("/opt/pkg{i}/data/file{j}.bin"),
                    mode: FileMode::Regular,
                    digest: [(j % 256) as u8; 32],
                    color: Color(0),
                });
            }
            if conflict_stride > 0 && i > 0 && i % conflict_stride == 0 {
                files.push(BenchFile {
                    path: "/etc/shared.conf".to_owned(),
                    mode: FileMode::Regular,
                    digest: [i as u8; 32],
                    color: Color(0),
                });
            }
            packages.push(files);
        }
        Self { packages }
    }
}

impl FileIterator<usize, usize> for SyntheticPackages {
    fn handle_for(&self, id: &usize) -> Option<usize> {
        (*id < self.packages.len()).then_some(*id)
    }

    fn iterate(
        &self,
        handle: &usize,
        flags: IterFlags,
        visit: &mut dyn FnMut(&FileEntry),
    ) -> Result<(), IteratorError> {
        for f in &self.packages[*handle] {
            if flags.only_directories {
                let dir_len = f.path.rfind('/').map_or(0, |i| i + 1);
                let prefix = &f.path[..dir_len];
                visit(&FileEntry {
                    path: prefix.to_owned(),
                    dir_len: prefix.len(),
                    dir_index: 0,
                    mode: FileMode::Directory,
                    digest: [0; 32],
                    color: Color(0),
                    is_ghost: false,
                });
                continue;
            }
            let dir_len = f.path.rfind('/').map_or(0, |i| i + 1);
            visit(&FileEntry {
                path: f.path.clone(),
                dir_len,
                dir_index: 0,
                mode: f.mode,
                digest: f.digest,
                color: f.color,
                is_ghost: false,
            });
        }
        Ok(())
    }
}

fn ids(n: usize) -> Vec<usize> {
    (0..n).collect()
}

fn bench_non_alias_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("non_alias");

    let sizes: &[usize] = &[100, 1_000, 5_000];
    for &n in sizes {
        let pkgs = SyntheticPackages::build(n, 20, 10);
        let config = DetectorConfig::default();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("packages", n), &n, |b, &n| {
            let ids = ids(n);
            b.iter(|| find_file_conflicts(&ids, 0, &pkgs, &config));
        });
    }

    group.finish();
}

fn bench_no_conflicts(c: &mut Criterion) {
    let mut group = c.benchmark_group("no_conflicts");

    let sizes: &[usize] = &[100, 1_000, 5_000];
    for &n in sizes {
        // conflict_stride = 0 disables all shared paths: worst case for
        // hashing work with no payoff in emitted conflicts.
        let pkgs = SyntheticPackages::build(n, 20, 0);
        let config = DetectorConfig::default();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("packages", n), &n, |b, &n| {
            let ids = ids(n);
            b.iter(|| find_file_conflicts(&ids, 0, &pkgs, &config));
        });
    }

    group.finish();
}

fn bench_alias_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("alias_mode");

    let sizes: &[usize] = &[100, 1_000];
    for &n in sizes {
        let pkgs = SyntheticPackages::build(n, 20, 10);
        let mut config = DetectorConfig::default();
        config.flags = DetectFlags {
            use_filelist_index: false,
            check_dir_aliasing: true,
            use_root_dir: false,
        };

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("packages", n), &n, |b, &n| {
            let ids = ids(n);
            b.iter(|| find_file_conflicts(&ids, 0, &pkgs, &config));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_non_alias_mode,
    bench_no_conflicts,
    bench_alias_mode,
);
criterion_main!(benches);
