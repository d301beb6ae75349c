use std::path::PathBuf;

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use atletiq::config::EngineConfig;
use atletiq::form::{FormConfig, build_features};
use atletiq::matches::Match;
use atletiq::model::{TrainerConfig, train};
use atletiq::snapshot::{Snapshot, SnapshotKey};
use atletiq::source::{JsonDirSource, MatchSource};

fn season() -> Vec<Match> {
    JsonDirSource::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seasons"))
        .fetch_season(2024)
        .expect("fixture season")
}

fn bench_train(c: &mut Criterion) {
    let matches = season();
    c.bench_function("features_and_train", |b| {
        b.iter(|| {
            let features = build_features(black_box(&matches), &FormConfig::default()).unwrap();
            let model = train(&features, &TrainerConfig::default()).unwrap();
            black_box(model.report.iterations);
        })
    });
}

fn bench_predict(c: &mut Criterion) {
    let snap = Snapshot::build(SnapshotKey::now(2024), season(), &EngineConfig::default()).unwrap();
    c.bench_function("predict", |b| {
        b.iter(|| {
            let p = snap.predict(black_box("Bravo"), black_box("Delta")).unwrap();
            black_box(p.home_win);
        })
    });
}

fn bench_simulate(c: &mut Criterion) {
    let mut cfg = EngineConfig::default();
    cfg.simulation.seed = Some(1);
    cfg.simulation.runs = 2_000;
    let snap = Snapshot::build(SnapshotKey::now(2024), season(), &cfg).unwrap();
    c.bench_function("simulate_2000_runs", |b| {
        b.iter(|| {
            let table = snap.simulate(black_box(38)).unwrap();
            black_box(table.rows.len());
        })
    });
}

criterion_group!(benches, bench_train, bench_predict, bench_simulate);
criterion_main!(benches);
