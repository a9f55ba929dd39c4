//! Benchmarks for snapshot commits and queries.

use assetflow::fileset::{Commit, FileRole, Snapshot, StagingArea};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn staged(paths: impl IntoIterator<Item = String>) -> StagingArea {
    let area = StagingArea::new(FileRole::Resource).unwrap();
    for path in paths {
        std::fs::write(area.path_for(&path).unwrap(), path.as_bytes()).unwrap();
    }
    area
}

fn large_snapshot(files: usize) -> Snapshot {
    let area = staged((0..files).map(|i| format!("dir{}/file{i}.js", i % 16)));
    Snapshot::new().commit(Commit::new().add(area)).unwrap()
}

fn snapshot_benchmark(c: &mut Criterion) {
    let base = large_snapshot(2_000);

    c.bench_function("commit_replace_one", |b| {
        b.iter_batched(
            || staged(["dir0/file0.js".to_string()]),
            |area| {
                black_box(
                    base.commit(Commit::new().remove("dir0/file0.js").add(area))
                        .unwrap(),
                )
            },
            criterion::BatchSize::SmallInput,
        );
    });

    c.bench_function("files_by_extension", |b| {
        b.iter(|| black_box(base.files_by_extension(&["js"]).len()));
    });
}

criterion_group!(benches, snapshot_benchmark);
criterion_main!(benches);
